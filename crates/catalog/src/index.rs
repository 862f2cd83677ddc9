//! Catalog building, secondary indices and precomputed statistics.

use crate::error::{CatalogError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

impl CatalogIndex {
    /// Load a complete catalog from a data directory.
    ///
    /// Expects three `::`-delimited files: `movies.dat`, `ratings.dat` and
    /// `events.dat` (the last one may be absent for rating-only datasets).
    ///
    /// Steps:
    /// 1. Parse the files (movies/ratings in parallel via rayon)
    /// 2. Populate the primary stores
    /// 3. Build secondary indices and statistics
    /// 4. Validate referential integrity
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        let movies_path = data_dir.join("movies.dat");
        let ratings_path = data_dir.join("ratings.dat");
        let events_path = data_dir.join("events.dat");

        let (movies, ratings) = rayon::join(
            || parser::parse_movies(&movies_path),
            || parser::parse_ratings(&ratings_path),
        );
        let movies = movies?;
        let ratings = ratings?;
        let events = if events_path.exists() {
            parser::parse_events(&events_path)?
        } else {
            Vec::new()
        };

        let mut index = CatalogIndex::new();
        for movie in movies {
            index.insert_movie(movie);
        }
        for rating in ratings {
            index.upsert_rating(rating);
        }
        for event in events {
            index.insert_event(event);
        }

        index.finalize();
        index.validate()?;
        Ok(index)
    }

    /// Rebuild secondary indices, sort event streams and recompute stats.
    ///
    /// Must be called after bulk mutation; `load_from_files` does it for you.
    pub fn finalize(&mut self) {
        self.build_secondary_indices();
        self.sort_events();
        self.compute_movie_stats();
    }

    /// Build the genre and year indices from the primary movie store.
    ///
    /// Iterates in stable catalog order so every per-genre and per-year
    /// list is itself deterministically ordered.
    pub fn build_secondary_indices(&mut self) {
        self.genre_index.clear();
        self.year_index.clear();

        for idx in 0..self.order.len() {
            let movie_id = self.order[idx];
            let Some(movie) = self.movies.get(&movie_id) else {
                continue;
            };
            for &genre in &movie.genres {
                self.genre_index.entry(genre).or_default().push(movie_id);
            }
            if let Some(year) = movie.year {
                self.year_index.entry(year).or_default().push(movie_id);
            }
        }
    }

    /// Sort each user's event stream by timestamp (stable, so arrival order
    /// breaks ties).
    fn sort_events(&mut self) {
        for events in self.user_events.values_mut() {
            events.sort_by_key(|e| e.timestamp);
        }
    }

    /// Recompute per-movie aggregate statistics in parallel.
    pub fn compute_movie_stats(&mut self) {
        self.movie_stats = self
            .movie_ratings
            .par_iter()
            .map(|(&movie_id, ratings)| {
                let rating_count = ratings.len() as u32;
                let avg_rating = if rating_count > 0 {
                    ratings.iter().map(|r| r.value).sum::<f32>() / rating_count as f32
                } else {
                    0.0
                };
                let stats = MovieStats {
                    avg_rating,
                    rating_count,
                    popularity_score: popularity_score(avg_rating, rating_count),
                };
                (movie_id, stats)
            })
            .collect();
    }

    /// Validate referential integrity and value ranges.
    ///
    /// - every rating and event must reference a known movie
    /// - rating values must lie in 0.5-5.0
    pub fn validate(&self) -> Result<()> {
        for ratings in self.user_ratings.values() {
            for rating in ratings {
                if !self.movies.contains_key(&rating.movie_id) {
                    return Err(CatalogError::MissingReference {
                        entity: "Movie".to_string(),
                        id: rating.movie_id,
                    });
                }
                if !(0.5..=5.0).contains(&rating.value) {
                    return Err(CatalogError::InvalidValue {
                        field: "rating".to_string(),
                        value: rating.value.to_string(),
                    });
                }
            }
        }
        for events in self.user_events.values() {
            for event in events {
                if !self.movies.contains_key(&event.movie_id) {
                    return Err(CatalogError::MissingReference {
                        entity: "Movie".to_string(),
                        id: event.movie_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Count interaction events per movie inside a trailing window.
    ///
    /// Feeds the popularity fallback ranking. `now` is injected so callers
    /// (and tests) control the clock.
    pub fn recent_interaction_counts(&self, window_days: u32, now: i64) -> HashMap<MovieId, u32> {
        let cutoff = now - i64::from(window_days) * 86_400;
        let mut counts: HashMap<MovieId, u32> = HashMap::new();
        for events in self.user_events.values() {
            for event in events {
                if event.timestamp >= cutoff {
                    *counts.entry(event.movie_id).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}

/// Popularity formula: `avg_rating * ln(rating_count + 1)`.
///
/// Rewards both high ratings and rating volume.
fn popularity_score(avg_rating: f32, rating_count: u32) -> f32 {
    avg_rating * (rating_count as f32 + 1.0).ln()
}
