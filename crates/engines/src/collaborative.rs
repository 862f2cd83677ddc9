//! Collaborative Engine: truncated-SVD latent factor model over the
//! user/movie rating matrix.
//!
//! ## Model lifecycle
//! The factorization is expensive, so it lives in a slot with three
//! effective states: fresh (younger than the TTL and built against the
//! current catalog version), stale (usable but due for rebuild), and
//! building. Rebuilds are single-flight: the first request to find the
//! model stale takes the build, concurrent requests are served the stale
//! model immediately, and requests arriving before any model exists wait
//! on a condvar. A burst of N requests against an expired model performs
//! exactly one factorization.

use crate::error::{EngineError, Result};
use crate::svd::{factor_dot, truncated_factors};
use crate::ScoredMovie;
use catalog::{CatalogIndex, Genre, MovieId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Tuning knobs for the collaborative engine.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Target factorization rank; clamped to the rating matrix dimensions.
    pub rank: usize,
    /// How long a built model stays fresh.
    pub model_ttl: Duration,
    /// Ratings at or above this mark a genre as liked.
    pub like_threshold: f32,
    /// Multiplicative bonus for movies sharing a liked genre.
    pub genre_boost: f32,
    /// Minimum ratings before predictions are attempted for a user.
    pub min_ratings: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            rank: 50,
            model_ttl: Duration::from_secs(600),
            like_threshold: 4.0,
            genre_boost: 0.15,
            min_ratings: 2,
        }
    }
}

const FACTOR_SEED: u64 = 42;
const RATING_MIN: f32 = 0.5;
const RATING_MAX: f32 = 5.0;

/// Immutable factorization snapshot.
struct LatentModel {
    /// Row index per user id in the factor matrices.
    user_rows: HashMap<UserId, usize>,
    /// Per-user mean rating, added back to centered predictions.
    user_means: Vec<f32>,
    user_factors: Vec<f32>,
    item_factors: Vec<f32>,
    rank: usize,
    catalog_version: u64,
    built_at: Instant,
}

#[derive(Default)]
struct ModelSlot {
    model: Option<Arc<LatentModel>>,
    building: bool,
    /// Set by [`CollaborativeEngine::invalidate`]; cleared on rebuild.
    stale: bool,
}

/// Latent-factor recommender with TTL-based, single-flight model rebuilds.
pub struct CollaborativeEngine {
    catalog: Arc<CatalogIndex>,
    config: CollabConfig,
    slot: Mutex<ModelSlot>,
    build_done: Condvar,
    rebuild_count: AtomicU64,
}

impl CollaborativeEngine {
    pub fn new(catalog: Arc<CatalogIndex>, config: CollabConfig) -> Self {
        Self {
            catalog,
            config,
            slot: Mutex::new(ModelSlot::default()),
            build_done: Condvar::new(),
            rebuild_count: AtomicU64::new(0),
        }
    }

    /// Up to `n` unrated movies for `user_id`, by predicted rating with a
    /// liked-genre boost, descending. Ties break on ascending movie id.
    #[instrument(skip(self))]
    pub fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<ScoredMovie>> {
        let ratings = self.catalog.ratings_for_user(user_id);
        if ratings.len() < self.config.min_ratings {
            return Err(EngineError::InsufficientData {
                user_id,
                have: ratings.len(),
                need: self.config.min_ratings,
            });
        }

        let model = self.current_model()?;
        let row = *model.user_rows.get(&user_id).ok_or(EngineError::NotFound {
            entity: "user",
            id: user_id,
        })?;
        let mean = model.user_means[row];

        let rated: HashSet<MovieId> = ratings.iter().map(|r| r.movie_id).collect();
        let liked = self.liked_genres(user_id);

        let ids = self.catalog.movie_ids();
        let mut scored: Vec<ScoredMovie> = Vec::with_capacity(ids.len().saturating_sub(rated.len()));
        for (item_row, &movie_id) in ids.iter().enumerate() {
            if rated.contains(&movie_id) {
                continue;
            }
            let predicted = mean
                + factor_dot(
                    &model.user_factors,
                    row,
                    &model.item_factors,
                    item_row,
                    model.rank,
                );
            let mut score = predicted.clamp(RATING_MIN, RATING_MAX);
            if self.shares_liked_genre(movie_id, &liked) {
                score *= 1.0 + self.config.genre_boost;
            }
            scored.push(ScoredMovie { movie_id, score });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.movie_id.cmp(&b.movie_id)));
        scored.truncate(n);
        Ok(scored)
    }

    /// Predicted rating for a single (user, movie) pair, clamped to the
    /// valid rating range. No genre boost is applied here.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Result<f32> {
        let model = self.current_model()?;
        let row = *model.user_rows.get(&user_id).ok_or(EngineError::NotFound {
            entity: "user",
            id: user_id,
        })?;
        let item_row = self.catalog.row_of(movie_id).ok_or(EngineError::NotFound {
            entity: "movie",
            id: movie_id,
        })?;
        let predicted = model.user_means[row]
            + factor_dot(
                &model.user_factors,
                row,
                &model.item_factors,
                item_row,
                model.rank,
            );
        Ok(predicted.clamp(RATING_MIN, RATING_MAX))
    }

    /// Mark the current model stale. The next request triggers a rebuild;
    /// until it completes, requests keep being served the stale model.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.stale = true;
    }

    /// Number of physical factorizations performed so far.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count.load(Ordering::SeqCst)
    }

    /// Get a usable model, rebuilding at most once across concurrent
    /// callers. Callers holding a stale model are served immediately.
    fn current_model(&self) -> Result<Arc<LatentModel>> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(model) = slot.model.as_ref() {
                if !slot.stale && self.is_fresh(model) {
                    return Ok(Arc::clone(model));
                }
                if slot.building {
                    // Stale but usable; the builder will swap it out.
                    return Ok(Arc::clone(model));
                }
            } else if slot.building {
                // Cold start: nothing to serve, wait for the first build.
                slot = self
                    .build_done
                    .wait(slot)
                    .unwrap_or_else(|e| e.into_inner());
                continue;
            }

            slot.building = true;
            drop(slot);

            let built = self.rebuild();

            slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.building = false;
            match built {
                Ok(model) => {
                    slot.model = Some(Arc::clone(&model));
                    slot.stale = false;
                    self.build_done.notify_all();
                    return Ok(model);
                }
                Err(err) => {
                    warn!("model rebuild failed: {}", err);
                    self.build_done.notify_all();
                    return Err(err);
                }
            }
        }
    }

    fn is_fresh(&self, model: &LatentModel) -> bool {
        model.built_at.elapsed() < self.config.model_ttl
            && model.catalog_version == self.catalog.version()
    }

    /// Factorize the centered rating matrix. Missing entries read as the
    /// user's mean after de-centering, i.e. no signal either way.
    fn rebuild(&self) -> Result<Arc<LatentModel>> {
        let user_ids = self.catalog.rating_user_ids();
        let movie_ids = self.catalog.movie_ids();
        let (m, n) = (user_ids.len(), movie_ids.len());
        if m == 0 || n == 0 {
            return Err(EngineError::EmptyModel(
                "no ratings to factorize".to_string(),
            ));
        }
        let catalog_version = self.catalog.version();
        info!("rebuilding latent model: {} users x {} movies", m, n);
        let started = Instant::now();

        let mut user_rows = HashMap::with_capacity(m);
        let mut user_means = vec![0.0f32; m];
        let mut matrix = vec![0.0f32; m * n];

        for (row, &user_id) in user_ids.iter().enumerate() {
            user_rows.insert(user_id, row);
            let ratings = self.catalog.ratings_for_user(user_id);
            let mean =
                ratings.iter().map(|r| r.value).sum::<f32>() / ratings.len().max(1) as f32;
            user_means[row] = mean;
            for rating in ratings {
                if let Some(col) = self.catalog.row_of(rating.movie_id) {
                    matrix[row * n + col] = rating.value - mean;
                }
            }
        }

        let rank = self.config.rank.min(m).min(n);
        let (user_factors, item_factors) =
            truncated_factors(&matrix, m, n, rank, FACTOR_SEED);

        self.rebuild_count.fetch_add(1, Ordering::SeqCst);
        debug!(
            "latent model rebuilt in {:?} (rank {})",
            started.elapsed(),
            rank
        );

        Ok(Arc::new(LatentModel {
            user_rows,
            user_means,
            user_factors,
            item_factors,
            rank,
            catalog_version,
            built_at: Instant::now(),
        }))
    }

    /// Genres of movies the user rated at or above the like threshold.
    fn liked_genres(&self, user_id: UserId) -> HashSet<Genre> {
        let mut liked = HashSet::new();
        for rating in self.catalog.ratings_for_user(user_id) {
            if rating.value >= self.config.like_threshold {
                if let Some(movie) = self.catalog.get_movie(rating.movie_id) {
                    liked.extend(movie.genres.iter().copied());
                }
            }
        }
        liked
    }

    fn shares_liked_genre(&self, movie_id: MovieId, liked: &HashSet<Genre>) -> bool {
        if liked.is_empty() {
            return false;
        }
        self.catalog
            .get_movie(movie_id)
            .map(|movie| movie.genres.iter().any(|g| liked.contains(g)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{Movie, Rating};
    use std::thread;

    fn movie(id: MovieId, genres: Vec<Genre>) -> Movie {
        Movie {
            id,
            title: format!("Movie {}", id),
            genres,
            overview: String::new(),
            keywords: String::new(),
            year: Some(2000),
            vote_average: 7.0,
            vote_count: 100,
            popularity: 5.0,
        }
    }

    fn rating(user_id: UserId, movie_id: MovieId, value: f32) -> Rating {
        Rating {
            user_id,
            movie_id,
            value,
            timestamp: 1_700_000_000,
        }
    }

    fn create_test_catalog() -> CatalogIndex {
        let mut index = CatalogIndex::new();
        index.insert_movie(movie(1, vec![Genre::Action]));
        index.insert_movie(movie(2, vec![Genre::Action]));
        index.insert_movie(movie(3, vec![Genre::Romance]));
        index.insert_movie(movie(4, vec![Genre::Romance]));
        // Users 1 and 2 love action; user 3 loves romance.
        index.upsert_rating(rating(1, 1, 5.0));
        index.upsert_rating(rating(1, 3, 1.0));
        index.upsert_rating(rating(2, 1, 5.0));
        index.upsert_rating(rating(2, 2, 4.5));
        index.upsert_rating(rating(2, 3, 1.0));
        index.upsert_rating(rating(3, 3, 5.0));
        index.upsert_rating(rating(3, 4, 4.5));
        index.upsert_rating(rating(3, 1, 1.0));
        index.finalize();
        index
    }

    fn engine_with_ttl(ttl: Duration) -> CollaborativeEngine {
        let config = CollabConfig {
            model_ttl: ttl,
            ..CollabConfig::default()
        };
        CollaborativeEngine::new(Arc::new(create_test_catalog()), config)
    }

    #[test]
    fn test_recommend_excludes_rated_movies() {
        let engine = engine_with_ttl(Duration::from_secs(600));
        let results = engine.recommend(1, 10).unwrap();
        assert!(!results.iter().any(|r| r.movie_id == 1 || r.movie_id == 3));
        assert!(!results.is_empty());
    }

    #[test]
    fn test_recommend_favors_taste_neighborhood() {
        let engine = engine_with_ttl(Duration::from_secs(600));
        // User 1 mirrors user 2's action taste; movie 2 (action, rated 4.5
        // by user 2) should beat movie 4 (romance, loved only by user 3).
        let results = engine.recommend(1, 10).unwrap();
        let pos_action = results.iter().position(|r| r.movie_id == 2);
        let pos_romance = results.iter().position(|r| r.movie_id == 4);
        assert!(pos_action.unwrap() < pos_romance.unwrap());
    }

    #[test]
    fn test_thin_history_is_insufficient_data() {
        let mut index = create_test_catalog();
        index.upsert_rating(rating(9, 1, 5.0));
        index.finalize();
        let engine =
            CollaborativeEngine::new(Arc::new(index), CollabConfig::default());
        match engine.recommend(9, 5) {
            Err(EngineError::InsufficientData { user_id: 9, have: 1, need: 2 }) => {}
            other => panic!("expected InsufficientData, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_predict_is_in_rating_range() {
        let engine = engine_with_ttl(Duration::from_secs(600));
        let predicted = engine.predict(1, 2).unwrap();
        assert!((0.5..=5.0).contains(&predicted));
    }

    #[test]
    fn test_fresh_model_is_reused() {
        let engine = engine_with_ttl(Duration::from_secs(600));
        engine.recommend(1, 5).unwrap();
        engine.recommend(2, 5).unwrap();
        assert_eq!(engine.rebuild_count(), 1);
    }

    #[test]
    fn test_invalidate_forces_single_rebuild() {
        let engine = engine_with_ttl(Duration::from_secs(600));
        engine.recommend(1, 5).unwrap();
        engine.invalidate();
        engine.recommend(1, 5).unwrap();
        engine.recommend(2, 5).unwrap();
        assert_eq!(engine.rebuild_count(), 2);
    }

    #[test]
    fn test_concurrent_burst_rebuilds_exactly_once() {
        let engine = Arc::new(engine_with_ttl(Duration::from_secs(600)));
        // Prime, then expire the model.
        engine.recommend(1, 5).unwrap();
        engine.invalidate();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                engine.recommend(1, 5).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // One priming build plus exactly one rebuild for the whole burst.
        assert_eq!(engine.rebuild_count(), 2);
    }

    #[test]
    fn test_empty_catalog_is_empty_model() {
        let engine = CollaborativeEngine::new(
            Arc::new(CatalogIndex::new()),
            CollabConfig::default(),
        );
        match engine.current_model() {
            Err(EngineError::EmptyModel(_)) => {}
            _ => panic!("expected EmptyModel"),
        }
    }
}
