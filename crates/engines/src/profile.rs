//! Personalization Profiler: derives a per-user taste profile from rating
//! and interaction history.
//!
//! A profile is a deterministic pure function of the user's history and an
//! injected `now` timestamp, so tests can pin the clock. Profiles are
//! cached through a [`TtlCache`] and never error: a user with no history
//! gets an empty default profile.

use crate::cache::{CachePolicy, TtlCache};
use catalog::{CatalogIndex, Genre, UserId};
use chrono::{DateTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

const SECONDS_PER_DAY: i64 = 86_400;
/// Interactions inside this window count double toward genre frequency
/// and feed `recent_genres`.
const RECENT_WINDOW_DAYS: i64 = 7;
const RECENCY_WEIGHT: f32 = 2.0;
const FAVORITE_GENRE_LIMIT: usize = 5;
const RECENT_GENRE_LIMIT: usize = 3;

/// Coarse time-of-day bucket for watch habits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WatchHourBucket {
    /// 06:00-11:59
    Morning,
    /// 12:00-17:59
    Afternoon,
    /// 18:00-23:59
    Evening,
    /// 00:00-05:59
    Night,
}

impl WatchHourBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => WatchHourBucket::Morning,
            12..=17 => WatchHourBucket::Afternoon,
            18..=23 => WatchHourBucket::Evening,
            _ => WatchHourBucket::Night,
        }
    }

    fn ordinal(self) -> u8 {
        match self {
            WatchHourBucket::Morning => 0,
            WatchHourBucket::Afternoon => 1,
            WatchHourBucket::Evening => 2,
            WatchHourBucket::Night => 3,
        }
    }
}

/// Derived taste profile for one user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    /// Top genres by recency-weighted interaction frequency.
    pub favorite_genres: Vec<Genre>,
    /// Top genres inside the recent window only.
    pub recent_genres: Vec<Genre>,
    /// Normalized genre frequencies; sums to 1 when non-empty.
    pub genre_weights: HashMap<Genre, f32>,
    /// Mean of the user's rating facts; `None` with no ratings.
    pub avg_rating: Option<f32>,
    /// Modal decade of interacted movies (e.g. 1990).
    pub preferred_decade: Option<u16>,
    /// Modal time-of-day bucket of interaction events.
    pub preferred_watch_hour: Option<WatchHourBucket>,
    pub total_events: usize,
}

impl UserProfile {
    fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }
}

/// Builds and caches [`UserProfile`]s.
pub struct Profiler {
    catalog: Arc<CatalogIndex>,
    cache: TtlCache<UserId, Arc<UserProfile>>,
}

impl Profiler {
    pub fn new(catalog: Arc<CatalogIndex>, cache_policy: CachePolicy) -> Self {
        Self {
            catalog,
            cache: TtlCache::new(cache_policy),
        }
    }

    /// Cached profile for `user_id`, built at unix time `now` on a miss.
    #[instrument(skip(self))]
    pub fn profile(&self, user_id: UserId, now: i64) -> Arc<UserProfile> {
        self.cache
            .get_or_insert_with(user_id, || Arc::new(self.build_profile(user_id, now)))
    }

    /// Drop all cached profiles.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn build_profile(&self, user_id: UserId, now: i64) -> UserProfile {
        let ratings = self.catalog.ratings_for_user(user_id);
        let events = self.catalog.events_for_user(user_id);
        if ratings.is_empty() && events.is_empty() {
            return UserProfile::empty(user_id);
        }

        let recent_cutoff = now - RECENT_WINDOW_DAYS * SECONDS_PER_DAY;

        // Genre frequency over every interaction the user has, ratings
        // included; recent interactions count double.
        let mut genre_counts: HashMap<Genre, f32> = HashMap::new();
        let mut recent_counts: HashMap<Genre, f32> = HashMap::new();
        let mut decade_counts: HashMap<u16, u32> = HashMap::new();
        let mut hour_counts: HashMap<WatchHourBucket, u32> = HashMap::new();

        let interactions = ratings
            .iter()
            .map(|r| (r.movie_id, r.timestamp))
            .chain(events.iter().map(|e| (e.movie_id, e.timestamp)));

        for (movie_id, timestamp) in interactions {
            let Some(movie) = self.catalog.get_movie(movie_id) else {
                continue;
            };
            let recent = timestamp >= recent_cutoff;
            let weight = if recent { RECENCY_WEIGHT } else { 1.0 };
            for &genre in &movie.genres {
                *genre_counts.entry(genre).or_insert(0.0) += weight;
                if recent {
                    *recent_counts.entry(genre).or_insert(0.0) += 1.0;
                }
            }
            if let Some(year) = movie.year {
                *decade_counts.entry((year / 10) * 10).or_insert(0) += 1;
            }
        }

        for event in events {
            if let Some(dt) = DateTime::from_timestamp(event.timestamp, 0) {
                *hour_counts
                    .entry(WatchHourBucket::from_hour(dt.hour()))
                    .or_insert(0) += 1;
            }
        }

        let avg_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().map(|r| r.value).sum::<f32>() / ratings.len() as f32)
        };

        UserProfile {
            user_id,
            favorite_genres: top_genres(&genre_counts, FAVORITE_GENRE_LIMIT),
            recent_genres: top_genres(&recent_counts, RECENT_GENRE_LIMIT),
            genre_weights: normalize(genre_counts),
            avg_rating,
            preferred_decade: modal_decade(&decade_counts),
            preferred_watch_hour: modal_bucket(&hour_counts),
            total_events: events.len(),
        }
    }
}

/// Highest-count genres, ties broken by genre ordinal for determinism.
fn top_genres(counts: &HashMap<Genre, f32>, limit: usize) -> Vec<Genre> {
    let mut ranked: Vec<(Genre, f32)> = counts.iter().map(|(&g, &c)| (g, c)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.ordinal().cmp(&b.0.ordinal())));
    ranked.truncate(limit);
    ranked.into_iter().map(|(g, _)| g).collect()
}

fn normalize(counts: HashMap<Genre, f32>) -> HashMap<Genre, f32> {
    let total: f32 = counts.values().sum();
    if total <= 0.0 {
        return HashMap::new();
    }
    counts.into_iter().map(|(g, c)| (g, c / total)).collect()
}

fn modal_decade(counts: &HashMap<u16, u32>) -> Option<u16> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(&decade, _)| decade)
}

fn modal_bucket(counts: &HashMap<WatchHourBucket, u32>) -> Option<WatchHourBucket> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.ordinal().cmp(&a.0.ordinal())))
        .map(|(&bucket, _)| bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{EventKind, InteractionEvent, Movie, MovieId, Rating};
    use std::time::Duration;

    // 2023-11-14 22:13:20 UTC, an evening hour.
    const NOW: i64 = 1_700_000_000;

    fn movie(id: MovieId, genres: Vec<Genre>, year: u16) -> Movie {
        Movie {
            id,
            title: format!("Movie {}", id),
            genres,
            overview: String::new(),
            keywords: String::new(),
            year: Some(year),
            vote_average: 7.0,
            vote_count: 100,
            popularity: 5.0,
        }
    }

    fn event(user_id: UserId, movie_id: MovieId, timestamp: i64) -> InteractionEvent {
        InteractionEvent {
            user_id,
            movie_id,
            kind: EventKind::Watch,
            timestamp,
            value: None,
        }
    }

    fn create_test_catalog() -> CatalogIndex {
        let mut index = CatalogIndex::new();
        index.insert_movie(movie(1, vec![Genre::Action], 1995));
        index.insert_movie(movie(2, vec![Genre::Action], 1999));
        index.insert_movie(movie(3, vec![Genre::Comedy], 2010));
        index.finalize();
        index
    }

    fn profiler(index: CatalogIndex) -> Profiler {
        Profiler::new(
            Arc::new(index),
            CachePolicy::new(Duration::from_secs(300), 128),
        )
    }

    #[test]
    fn test_empty_history_gives_default_profile() {
        let profiler = profiler(create_test_catalog());
        let profile = profiler.profile(42, NOW);
        assert_eq!(profile.user_id, 42);
        assert!(profile.favorite_genres.is_empty());
        assert!(profile.avg_rating.is_none());
        assert!(profile.preferred_watch_hour.is_none());
        assert_eq!(profile.total_events, 0);
    }

    #[test]
    fn test_recent_interactions_weigh_double() {
        let mut index = create_test_catalog();
        // Two old comedy watches vs one recent action watch: 2.0 weight
        // for the recent one ties the counts, ordinal breaks toward Action.
        let old = NOW - 30 * SECONDS_PER_DAY;
        index.insert_event(event(1, 3, old));
        index.insert_event(event(1, 3, old + 60));
        index.insert_event(event(1, 1, NOW - 3600));
        index.finalize();

        let profile = profiler(index).profile(1, NOW);
        assert_eq!(profile.favorite_genres[0], Genre::Action);
        assert_eq!(profile.recent_genres, vec![Genre::Action]);
    }

    #[test]
    fn test_avg_rating_and_decade() {
        let mut index = create_test_catalog();
        index.upsert_rating(Rating {
            user_id: 1,
            movie_id: 1,
            value: 4.0,
            timestamp: NOW - 100,
        });
        index.upsert_rating(Rating {
            user_id: 1,
            movie_id: 2,
            value: 5.0,
            timestamp: NOW - 50,
        });
        index.finalize();

        let profile = profiler(index).profile(1, NOW);
        assert_eq!(profile.avg_rating, Some(4.5));
        // Both rated movies are from the 1990s.
        assert_eq!(profile.preferred_decade, Some(1990));
    }

    #[test]
    fn test_genre_weights_sum_to_one() {
        let mut index = create_test_catalog();
        index.insert_event(event(1, 1, NOW - 100));
        index.insert_event(event(1, 3, NOW - 200));
        index.finalize();

        let profile = profiler(index).profile(1, NOW);
        let sum: f32 = profile.genre_weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preferred_watch_hour_is_modal_bucket() {
        let mut index = create_test_catalog();
        // NOW falls in the evening bucket; nudge two events there and one
        // twelve hours earlier.
        index.insert_event(event(1, 1, NOW));
        index.insert_event(event(1, 2, NOW - 120));
        index.insert_event(event(1, 3, NOW - 12 * 3600));
        index.finalize();

        let profile = profiler(index).profile(1, NOW);
        assert_eq!(profile.preferred_watch_hour, Some(WatchHourBucket::Evening));
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(WatchHourBucket::from_hour(0), WatchHourBucket::Night);
        assert_eq!(WatchHourBucket::from_hour(5), WatchHourBucket::Night);
        assert_eq!(WatchHourBucket::from_hour(6), WatchHourBucket::Morning);
        assert_eq!(WatchHourBucket::from_hour(12), WatchHourBucket::Afternoon);
        assert_eq!(WatchHourBucket::from_hour(18), WatchHourBucket::Evening);
        assert_eq!(WatchHourBucket::from_hour(23), WatchHourBucket::Evening);
    }

    #[test]
    fn test_profile_is_cached() {
        let profiler = profiler(create_test_catalog());
        let first = profiler.profile(1, NOW);
        let second = profiler.profile(1, NOW + 1000);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
