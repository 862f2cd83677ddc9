use anyhow::{Context, Result};
use catalog::{CatalogIndex, MovieId, UserId};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use server::{RecRequest, RecType, Recommender, RecommenderConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// CineRec - Movie Recommendation Engine
#[derive(Parser)]
#[command(name = "cinerec")]
#[command(about = "Hybrid movie recommendation engine", long_about = None)]
struct Cli {
    /// Path to the dataset directory (movies.dat, ratings.dat, events.dat)
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Content,
    Collaborative,
    Hybrid,
    Personalized,
}

impl From<Mode> for RecType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Content => RecType::Content,
            Mode::Collaborative => RecType::Collaborative,
            Mode::Hybrid => RecType::Hybrid,
            Mode::Personalized => RecType::Personalized,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Get movie recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        #[arg(long)]
        user_id: UserId,

        /// Scoring strategy
        #[arg(long, value_enum, default_value = "hybrid")]
        mode: Mode,

        /// Number of recommendations to return
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Show the reasons behind each recommendation
        #[arg(long)]
        explain: bool,

        /// Print the raw response as JSON instead of formatted output
        #[arg(long)]
        json: bool,
    },

    /// Find movies similar to a given movie
    Similar {
        /// Anchor movie ID
        #[arg(long)]
        movie_id: MovieId,

        /// Number of similar movies to return
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show a user's derived taste profile
    Profile {
        /// User ID to display
        #[arg(long)]
        user_id: UserId,
    },

    /// Search for movies by title
    Search {
        /// Movie title to search for (case-insensitive substring match)
        #[arg(long)]
        title: String,
    },

    /// Run a latency benchmark against the recommender
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("Loading catalog from {}...", cli.data_dir.display());
    let start = Instant::now();
    let catalog = Arc::new(
        CatalogIndex::load_from_files(&cli.data_dir).context("Failed to load catalog")?,
    );
    let (movies, ratings, events) = catalog.counts();
    println!(
        "{} Loaded {} movies, {} ratings, {} events in {:?}",
        "✓".green(),
        movies,
        ratings,
        events,
        start.elapsed()
    );

    let recommender = Recommender::new(catalog, RecommenderConfig::default());

    match cli.command {
        Commands::Recommend {
            user_id,
            mode,
            limit,
            explain,
            json,
        } => handle_recommend(recommender, user_id, mode, limit, explain, json).await?,
        Commands::Similar { movie_id, limit } => {
            handle_similar(recommender, movie_id, limit).await?
        }
        Commands::Profile { user_id } => handle_profile(recommender, user_id)?,
        Commands::Search { title } => handle_search(recommender, title)?,
        Commands::Benchmark { requests } => handle_benchmark(recommender, requests).await?,
    }

    Ok(())
}

async fn handle_recommend(
    recommender: Recommender,
    user_id: UserId,
    mode: Mode,
    limit: usize,
    explain: bool,
    json: bool,
) -> Result<()> {
    let request = RecRequest {
        rec_type: mode.into(),
        user_id: Some(user_id),
        movie_id: None,
        count: limit,
    };
    let response = recommender.recommend_async(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*response)?);
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:?} recommendations for user {} ({:?}):",
            mode, user_id, response.status
        )
        .bold()
        .blue()
    );
    for (i, item) in response.items.iter().enumerate() {
        println!(
            "{}. {} - {:.3}",
            (i + 1).to_string().green(),
            item.title,
            item.score
        );
        if explain {
            for reason in &item.reasons {
                println!("   - {}", reason.dimmed());
            }
        }
    }
    if response.items.is_empty() {
        println!("{}", "No recommendations available.".yellow());
    }
    Ok(())
}

async fn handle_similar(recommender: Recommender, movie_id: MovieId, limit: usize) -> Result<()> {
    let anchor = recommender
        .catalog()
        .get_movie(movie_id)
        .map(|m| m.title.clone())
        .unwrap_or_else(|| format!("movie {}", movie_id));
    let response = recommender
        .recommend_async(RecRequest::similar_to(movie_id, limit))
        .await?;

    println!(
        "{}",
        format!("Movies similar to {}:", anchor).bold().blue()
    );
    if response.items.is_empty() {
        println!("{}", format!("Nothing found ({:?}).", response.status).yellow());
        return Ok(());
    }
    for (i, item) in response.items.iter().enumerate() {
        println!(
            "{}. {} - {:.3}",
            (i + 1).to_string().green(),
            item.title,
            item.score
        );
    }
    Ok(())
}

fn handle_profile(recommender: Recommender, user_id: UserId) -> Result<()> {
    let profile = recommender.profile(user_id);

    println!("{}", format!("Profile for user {}:", user_id).bold().blue());
    let favorites = profile
        .favorite_genres
        .iter()
        .map(|g| g.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let recent = profile
        .recent_genres
        .iter()
        .map(|g| g.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    println!("{}Favorite genres: {}", "• ".green(), favorites);
    println!("{}Recently watched: {}", "• ".green(), recent);
    match profile.avg_rating {
        Some(avg) => println!("{}Average rating: {:.2}", "• ".cyan(), avg),
        None => println!("{}Average rating: n/a", "• ".cyan()),
    }
    match profile.preferred_decade {
        Some(decade) => println!("{}Preferred decade: {}s", "• ".cyan(), decade),
        None => println!("{}Preferred decade: n/a", "• ".cyan()),
    }
    match profile.preferred_watch_hour {
        Some(bucket) => println!("{}Usual watch time: {:?}", "• ".cyan(), bucket),
        None => println!("{}Usual watch time: n/a", "• ".cyan()),
    }
    println!("{}Interaction events: {}", "• ".cyan(), profile.total_events);
    Ok(())
}

fn handle_search(recommender: Recommender, title: String) -> Result<()> {
    let catalog = recommender.catalog();
    let needle = title.to_lowercase();

    // Exact title matches rank ahead of substring matches, then by rating
    // volume-weighted quality.
    let mut matches: Vec<(MovieId, u8, f32)> = catalog
        .movie_ids()
        .iter()
        .filter_map(|&movie_id| {
            let movie = catalog.get_movie(movie_id)?;
            let lowered = movie.title.to_lowercase();
            let tier = if lowered == needle {
                0
            } else if lowered.contains(&needle) {
                1
            } else {
                return None;
            };
            let popularity = catalog
                .stats_for_movie(movie_id)
                .map(|s| s.popularity_score)
                .unwrap_or(0.0);
            Some((movie_id, tier, popularity))
        })
        .collect();
    matches.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.total_cmp(&a.2)));

    println!("{}", format!("Search results for '{}':", title).bold().blue());
    for (movie_id, _, _) in matches.iter().take(20) {
        if let Some(movie) = catalog.get_movie(*movie_id) {
            let genres = movie
                .genres
                .iter()
                .map(|g| g.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let stats = catalog.stats_for_movie(*movie_id);
            println!(
                "{}: {} [{}] avg {:.2} ({} ratings)",
                movie_id,
                movie.title,
                genres,
                stats.map(|s| s.avg_rating).unwrap_or(0.0),
                stats.map(|s| s.rating_count).unwrap_or(0)
            );
        }
    }
    if matches.is_empty() {
        println!("{}", "No matches.".yellow());
    }
    Ok(())
}

async fn handle_benchmark(recommender: Recommender, requests: usize) -> Result<()> {
    let user_ids = recommender.catalog().rating_user_ids();
    if user_ids.is_empty() {
        println!("{}", "No users with ratings to benchmark against.".yellow());
        return Ok(());
    }

    let mut handles = vec![];
    for i in 0..requests {
        let recommender = recommender.clone();
        let user_id = user_ids[rand::random_range(0..user_ids.len())];
        let count = 10 + (i % 3);
        handles.push(tokio::spawn(async move {
            let start = Instant::now();
            recommender
                .recommend_async(RecRequest::hybrid(user_id, count))
                .await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings = vec![];
    for handle in handles {
        timings.push(handle.await??);
    }

    let total_time: std::time::Duration = timings.iter().sum();
    let avg_latency = total_time / (timings.len() as u32);
    timings.sort();
    let p50 = timings[timings.len() / 2];
    let p95 = timings[((timings.len() as f32 * 0.95) as usize).min(timings.len() - 1)];
    let p99 = timings[((timings.len() as f32 * 0.99) as usize).min(timings.len() - 1)];
    let throughput = requests as f32 / total_time.as_secs_f32();

    println!("Benchmark results:");
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", p50);
    println!("P95 latency: {:?}", p95);
    println!("P99 latency: {:?}", p99);
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}
