//! Popularity Fallback: windowed interaction-volume ranking.
//!
//! Serves two roles: a score source for the hybrid blend, and the safety
//! net the scorer falls back to when personalized engines cannot produce
//! enough candidates. Movies with interaction volume inside the window
//! always outrank the vote-average backfill, and the fallback list is
//! shuffled deterministically per user so repeat requests are stable but
//! different users see variety.

use crate::ScoredMovie;
use catalog::{CatalogIndex, MovieId, UserId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Fallback pool is this many times the requested count before shuffling.
const POOL_FACTOR: usize = 3;

#[derive(Debug, Clone)]
pub struct PopularityConfig {
    /// Interaction events inside this many days count toward volume.
    pub window_days: u32,
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

/// Ranks the catalog by recent interaction volume. Never errors.
pub struct PopularityEngine {
    catalog: Arc<CatalogIndex>,
    config: PopularityConfig,
}

impl PopularityEngine {
    pub fn new(catalog: Arc<CatalogIndex>, config: PopularityConfig) -> Self {
        Self { catalog, config }
    }

    /// Full popularity ranking at unix time `now`, descending, ties on
    /// ascending movie id.
    ///
    /// Movies with in-window volume score in (0.5, 1.0] proportional to the
    /// busiest movie; the rest backfill in (0, 0.5] from `vote_average`, so
    /// observed demand always outranks catalog metadata.
    #[instrument(skip(self))]
    pub fn ranked(&self, now: i64) -> Vec<ScoredMovie> {
        let counts = self
            .catalog
            .recent_interaction_counts(self.config.window_days, now);
        let max_count = counts.values().copied().max().unwrap_or(0) as f32;
        debug!("{} movies with in-window interactions", counts.len());

        let mut ranked: Vec<ScoredMovie> = self
            .catalog
            .movie_ids()
            .iter()
            .map(|&movie_id| {
                let score = match counts.get(&movie_id) {
                    Some(&count) if max_count > 0.0 => {
                        0.5 + 0.5 * (count as f32 / max_count)
                    }
                    _ => {
                        let vote_average = self
                            .catalog
                            .get_movie(movie_id)
                            .map(|m| m.vote_average)
                            .unwrap_or(0.0);
                        (vote_average / 10.0).clamp(0.0, 1.0) * 0.5
                    }
                };
                ScoredMovie { movie_id, score }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.movie_id.cmp(&b.movie_id)));
        ranked
    }

    /// Popularity score per movie, for blending.
    pub fn scores(&self, now: i64) -> HashMap<MovieId, f32> {
        self.ranked(now)
            .into_iter()
            .map(|s| (s.movie_id, s.score))
            .collect()
    }

    /// Up to `n` popular movies for a fallback response. The top of the
    /// ranking is pooled and shuffled with a seed derived from the user id,
    /// so the same user always sees the same order. Anonymous requests use
    /// seed zero.
    pub fn fallback(&self, user_id: Option<UserId>, n: usize, now: i64) -> Vec<ScoredMovie> {
        let mut pool = self.ranked(now);
        pool.truncate(n.saturating_mul(POOL_FACTOR).max(n));

        let seed = user_id.map(seed_for_user).unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(seed);
        pool.shuffle(&mut rng);
        pool.truncate(n);
        pool
    }
}

fn seed_for_user(user_id: UserId) -> u64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
