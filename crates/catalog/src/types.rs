//! Core domain types for the movie catalog.
//!
//! The catalog is the in-memory source of truth for movies, rating facts
//! and interaction events. Everything downstream (engines, ranking, the
//! recommender) borrows from a shared [`CatalogIndex`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user.
pub type UserId = u32;

/// Unique identifier for a movie.
pub type MovieId = u32;

// =============================================================================
// Genre
// =============================================================================

/// Validated, interned movie genre.
///
/// Genre strings are parsed exactly once, at catalog load time; the rest of
/// the system only ever sees this enum. Unknown strings are rejected by the
/// parser rather than carried around as free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Family,
    Fantasy,
    History,
    Horror,
    Music,
    Mystery,
    Romance,
    SciFi,
    Thriller,
    TvMovie,
    War,
    Western,
}

impl Genre {
    /// All genres, in canonical order. Used for deterministic tie-breaks.
    pub const ALL: [Genre; 19] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Family,
        Genre::Fantasy,
        Genre::History,
        Genre::Horror,
        Genre::Music,
        Genre::Mystery,
        Genre::Romance,
        Genre::SciFi,
        Genre::Thriller,
        Genre::TvMovie,
        Genre::War,
        Genre::Western,
    ];

    /// Canonical display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Family => "Family",
            Genre::Fantasy => "Fantasy",
            Genre::History => "History",
            Genre::Horror => "Horror",
            Genre::Music => "Music",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Science Fiction",
            Genre::Thriller => "Thriller",
            Genre::TvMovie => "TV Movie",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }

    /// Position in [`Genre::ALL`], for deterministic ordering.
    pub fn ordinal(&self) -> usize {
        Genre::ALL.iter().position(|g| g == self).unwrap_or(0)
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = String;

    /// Accepts canonical TMDB names plus common variants ("Sci-Fi",
    /// "Science Fiction", "TV Movie"), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "action" => Ok(Genre::Action),
            "adventure" => Ok(Genre::Adventure),
            "animation" => Ok(Genre::Animation),
            "comedy" => Ok(Genre::Comedy),
            "crime" => Ok(Genre::Crime),
            "documentary" => Ok(Genre::Documentary),
            "drama" => Ok(Genre::Drama),
            "family" | "children" | "children's" => Ok(Genre::Family),
            "fantasy" => Ok(Genre::Fantasy),
            "history" => Ok(Genre::History),
            "horror" => Ok(Genre::Horror),
            "music" | "musical" => Ok(Genre::Music),
            "mystery" => Ok(Genre::Mystery),
            "romance" => Ok(Genre::Romance),
            "science fiction" | "sci-fi" | "scifi" => Ok(Genre::SciFi),
            "thriller" => Ok(Genre::Thriller),
            "tv movie" | "tvmovie" => Ok(Genre::TvMovie),
            "war" => Ok(Genre::War),
            "western" => Ok(Genre::Western),
            _ => Err(format!("unknown genre: {}", s)),
        }
    }
}

// =============================================================================
// Movie
// =============================================================================

/// A movie record as provided by the catalog.
///
/// Immutable within a scoring cycle; the catalog provider owns the data and
/// bumps the catalog version when records change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub genres: Vec<Genre>,
    /// Free-text synopsis, feeds the TF-IDF feature space.
    pub overview: String,
    /// Space-separated keyword tags, also feeds the feature space.
    pub keywords: String,
    pub year: Option<u16>,
    /// Community rating on a 0-10 scale.
    pub vote_average: f32,
    pub vote_count: u32,
    /// Upstream popularity signal (unbounded, provider-defined).
    pub popularity: f32,
}

// =============================================================================
// Rating
// =============================================================================

/// A single rating fact on a 0.5-5.0 scale.
///
/// The catalog upserts by latest timestamp per (user, movie) pair, so at
/// most one rating is retained for each pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub value: f32,
    /// Unix timestamp (seconds) when the rating was made.
    pub timestamp: i64,
}

// =============================================================================
// Interaction Events
// =============================================================================

/// The kind of user interaction recorded by the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    View,
    Like,
    Dislike,
    Watch,
    Rate,
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(EventKind::View),
            "like" => Ok(EventKind::Like),
            "dislike" => Ok(EventKind::Dislike),
            "watch" => Ok(EventKind::Watch),
            "rate" => Ok(EventKind::Rate),
            _ => Err(format!("unknown event kind: {}", s)),
        }
    }
}

/// A behavioral event; drives the personalization profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub kind: EventKind,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// Optional numeric payload (e.g. the rating value for `Rate` events).
    pub value: Option<f32>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Precomputed per-movie rating statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MovieStats {
    pub avg_rating: f32,
    pub rating_count: u32,
    /// `avg_rating * ln(rating_count + 1)` - rewards both quality and volume.
    pub popularity_score: f32,
}

// =============================================================================
// CatalogIndex
// =============================================================================

/// In-memory catalog with primary stores and secondary indices.
///
/// Provides O(1) lookups for movies and per-user/per-movie rating facts.
/// The insertion order of movies is preserved as the *stable catalog order*
/// used for deterministic tie-breaking throughout the engines.
#[derive(Debug)]
pub struct CatalogIndex {
    // Primary stores
    pub(crate) movies: HashMap<MovieId, Movie>,
    /// Stable catalog order (movie insertion order).
    pub(crate) order: Vec<MovieId>,
    pub(crate) row_of: HashMap<MovieId, usize>,

    // Rating facts, upserted by latest timestamp per (user, movie)
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    pub(crate) movie_ratings: HashMap<MovieId, Vec<Rating>>,

    // Interaction events, time-ordered per user
    pub(crate) user_events: HashMap<UserId, Vec<InteractionEvent>>,

    // Secondary indices
    pub(crate) genre_index: HashMap<Genre, Vec<MovieId>>,
    pub(crate) year_index: BTreeMap<u16, Vec<MovieId>>,

    // Precomputed statistics
    pub(crate) movie_stats: HashMap<MovieId, MovieStats>,

    /// Bumped on every movie insertion; the content engine rebuilds its
    /// feature matrix only when this changes.
    pub(crate) version: u64,
}

impl CatalogIndex {
    /// Creates a new, empty catalog.
    pub fn new() -> Self {
        Self {
            movies: HashMap::new(),
            order: Vec::new(),
            row_of: HashMap::new(),
            user_ratings: HashMap::new(),
            movie_ratings: HashMap::new(),
            user_events: HashMap::new(),
            genre_index: HashMap::new(),
            year_index: BTreeMap::new(),
            movie_stats: HashMap::new(),
            version: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Getters
    // -------------------------------------------------------------------------

    /// Get a movie by ID.
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Stable catalog order of all movie IDs.
    pub fn movie_ids(&self) -> &[MovieId] {
        &self.order
    }

    /// Row index of a movie in the stable catalog order.
    pub fn row_of(&self, id: MovieId) -> Option<usize> {
        self.row_of.get(&id).copied()
    }

    /// All rating facts made by a user (one per movie, latest wins).
    pub fn ratings_for_user(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All rating facts received by a movie.
    pub fn ratings_for_movie(&self, movie_id: MovieId) -> &[Rating] {
        self.movie_ratings
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// User IDs with at least one rating, ascending. Deterministic.
    pub fn rating_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.user_ratings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Interaction events for a user, time-ordered.
    pub fn events_for_user(&self, user_id: UserId) -> &[InteractionEvent] {
        self.user_events
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All movies in a genre, in stable catalog order.
    pub fn movies_by_genre(&self, genre: Genre) -> &[MovieId] {
        self.genre_index
            .get(&genre)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All movies released in a year.
    pub fn movies_by_year(&self, year: u16) -> &[MovieId] {
        self.year_index
            .get(&year)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Precomputed statistics for a movie.
    pub fn stats_for_movie(&self, movie_id: MovieId) -> Option<&MovieStats> {
        self.movie_stats.get(&movie_id)
    }

    /// Catalog version; changes whenever movie records change.
    pub fn version(&self) -> u64 {
        self.version
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    /// Insert a movie, assigning it the next stable catalog row.
    ///
    /// Re-inserting an existing ID replaces the record but keeps its row.
    pub fn insert_movie(&mut self, movie: Movie) {
        let id = movie.id;
        if self.movies.insert(id, movie).is_none() {
            self.row_of.insert(id, self.order.len());
            self.order.push(id);
        }
        self.version += 1;
    }

    /// Upsert a rating fact: the latest-timestamp value is authoritative
    /// per (user, movie) pair. On equal timestamps the later insert wins.
    pub fn upsert_rating(&mut self, rating: Rating) {
        let by_user = self.user_ratings.entry(rating.user_id).or_default();
        match by_user.iter_mut().find(|r| r.movie_id == rating.movie_id) {
            Some(existing) if existing.timestamp > rating.timestamp => return,
            Some(existing) => *existing = rating,
            None => by_user.push(rating),
        }

        let by_movie = self.movie_ratings.entry(rating.movie_id).or_default();
        match by_movie.iter_mut().find(|r| r.user_id == rating.user_id) {
            Some(existing) => *existing = rating,
            None => by_movie.push(rating),
        }
    }

    /// Record an interaction event.
    ///
    /// Events are kept in arrival order; call [`CatalogIndex::finalize`]
    /// after bulk loading to restore time order.
    pub fn insert_event(&mut self, event: InteractionEvent) {
        self.user_events.entry(event.user_id).or_default().push(event);
    }

    /// Total counts: (movies, rating facts, events).
    pub fn counts(&self) -> (usize, usize, usize) {
        let ratings = self.user_ratings.values().map(|v| v.len()).sum();
        let events = self.user_events.values().map(|v| v.len()).sum();
        (self.movies.len(), ratings, events)
    }
}

impl Default for CatalogIndex {
    fn default() -> Self {
        Self::new()
    }
}
