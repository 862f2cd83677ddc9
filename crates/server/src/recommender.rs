//! Recommendation orchestrator.
//!
//! The [`Recommender`] owns all four engines, dispatches requests by
//! [`RecType`], runs blended candidates through the selection pipeline and
//! serves finished responses through a read-through TTL cache.
//!
//! ## Degradation policy
//! Recoverable engine conditions (unknown ids, thin history, empty pools)
//! never fail a request: they downgrade it to the popularity fallback and
//! the response says so in its [`RecStatus`]. Only
//! [`engines::EngineError::Internal`] propagates as an error. The terminal
//! degradation is an empty list with `RecStatus::NoRecommendations`.

use anyhow::Context;
use catalog::{CatalogIndex, MovieId, UserId};
use chrono::Utc;
use engines::{
    CachePolicy, CollabConfig, CollaborativeEngine, ContentEngine, PopularityConfig,
    PopularityEngine, Profiler, ScoredMovie, TtlCache, UserProfile,
};
use ranking::{
    blend_hybrid, score_personalized, BlendWeights, PersonalWeights, ScoreEntry,
    SelectionPipeline,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Which scoring strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecType {
    Content,
    Collaborative,
    Hybrid,
    Personalized,
}

/// A recommendation request. `movie_id` anchors content similarity,
/// `user_id` drives everything else; both are optional and the
/// degradation policy covers their absence.
#[derive(Debug, Clone)]
pub struct RecRequest {
    pub rec_type: RecType,
    pub user_id: Option<UserId>,
    pub movie_id: Option<MovieId>,
    pub count: usize,
}

impl RecRequest {
    pub fn hybrid(user_id: UserId, count: usize) -> Self {
        Self {
            rec_type: RecType::Hybrid,
            user_id: Some(user_id),
            movie_id: None,
            count,
        }
    }

    pub fn similar_to(movie_id: MovieId, count: usize) -> Self {
        Self {
            rec_type: RecType::Content,
            user_id: None,
            movie_id: Some(movie_id),
            count,
        }
    }
}

/// How the response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecStatus {
    /// The requested strategy produced the list.
    Ok,
    /// The popularity fallback filled some or all of the list.
    Fallback,
    /// A referenced movie or user does not exist.
    NotFound,
    /// Nothing could be recommended at all.
    NoRecommendations,
}

/// One recommended movie, presentation-ready.
#[derive(Debug, Clone, Serialize)]
pub struct RecItem {
    pub movie_id: MovieId,
    pub title: String,
    pub score: f32,
    pub reasons: Vec<String>,
}

/// A finished response.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub rec_type: RecType,
    pub status: RecStatus,
    pub items: Vec<RecItem>,
}

/// A content-similarity match.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarMovie {
    pub movie_id: MovieId,
    pub title: String,
    pub score: f32,
}

/// Tuning for the whole orchestrator. Engine configs nest here so one
/// value wires up everything.
#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    pub blend: BlendWeights,
    pub personal: PersonalWeights,
    pub collab: CollabConfig,
    pub popularity: PopularityConfig,
    /// Blended scores below this are dropped (backfilled only for thin
    /// pools).
    pub quality_floor: f32,
    /// Max times one genre may appear in a response.
    pub genre_cap: usize,
    /// Engines are asked for `pool_factor * count` candidates.
    pub pool_factor: usize,
    pub response_cache: CachePolicy,
    pub profile_cache: CachePolicy,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            blend: BlendWeights::default(),
            personal: PersonalWeights::default(),
            collab: CollabConfig::default(),
            popularity: PopularityConfig::default(),
            quality_floor: 0.2,
            genre_cap: 3,
            pool_factor: 5,
            response_cache: CachePolicy::new(Duration::from_secs(300), 4096),
            profile_cache: CachePolicy::new(Duration::from_secs(300), 4096),
        }
    }
}

type RecKey = (RecType, Option<UserId>, Option<MovieId>, usize);

struct Inner {
    catalog: Arc<CatalogIndex>,
    content: ContentEngine,
    collab: CollaborativeEngine,
    profiler: Profiler,
    popularity: PopularityEngine,
    config: RecommenderConfig,
    cache: TtlCache<RecKey, Arc<Recommendations>>,
}

/// Cheaply clonable handle; clones share engines, models and caches.
#[derive(Clone)]
pub struct Recommender {
    inner: Arc<Inner>,
}

impl Recommender {
    pub fn new(catalog: Arc<CatalogIndex>, config: RecommenderConfig) -> Self {
        let (movies, ratings, events) = catalog.counts();
        info!(
            "recommender over {} movies, {} ratings, {} events",
            movies, ratings, events
        );
        let inner = Inner {
            content: ContentEngine::new(Arc::clone(&catalog)),
            collab: CollaborativeEngine::new(Arc::clone(&catalog), config.collab.clone()),
            profiler: Profiler::new(Arc::clone(&catalog), config.profile_cache),
            popularity: PopularityEngine::new(Arc::clone(&catalog), config.popularity.clone()),
            cache: TtlCache::new(config.response_cache),
            catalog,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogIndex> {
        &self.inner.catalog
    }

    /// Serve a request, hitting the response cache first.
    pub fn recommend(&self, request: &RecRequest) -> anyhow::Result<Arc<Recommendations>> {
        self.recommend_at(request, Utc::now().timestamp())
    }

    /// Like [`Self::recommend`] with an injected clock, for deterministic
    /// windows in tests.
    #[instrument(skip(self))]
    pub fn recommend_at(
        &self,
        request: &RecRequest,
        now: i64,
    ) -> anyhow::Result<Arc<Recommendations>> {
        let key = (
            request.rec_type,
            request.user_id,
            request.movie_id,
            request.count,
        );
        if let Some(hit) = self.inner.cache.get(&key) {
            debug!("response cache hit");
            return Ok(hit);
        }
        let response = Arc::new(
            self.inner
                .compute(request, now)
                .context("computing recommendations")?,
        );
        self.inner.cache.insert(key, Arc::clone(&response));
        Ok(response)
    }

    /// Async wrapper: the computation is CPU-bound, so it runs on the
    /// blocking pool.
    pub async fn recommend_async(
        &self,
        request: RecRequest,
    ) -> anyhow::Result<Arc<Recommendations>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.recommend(&request))
            .await
            .context("recommendation task panicked")?
    }

    /// Movies most similar to `movie_id`, by content alone. Unknown movies
    /// yield an empty list, not an error.
    pub fn similar(&self, movie_id: MovieId, n: usize) -> anyhow::Result<Vec<SimilarMovie>> {
        let response = self.recommend(&RecRequest::similar_to(movie_id, n))?;
        Ok(response
            .items
            .iter()
            .map(|item| SimilarMovie {
                movie_id: item.movie_id,
                title: item.title.clone(),
                score: item.score,
            })
            .collect())
    }

    /// Taste profile for a user, built on demand and cached.
    pub fn profile(&self, user_id: UserId) -> Arc<UserProfile> {
        self.inner.profiler.profile(user_id, Utc::now().timestamp())
    }

    /// Invalidate the latent model and drop every cache. The next requests
    /// rebuild lazily; in-flight requests keep being served stale data.
    pub fn refresh_models(&self) {
        info!("refreshing models and caches");
        self.inner.collab.invalidate();
        self.inner.profiler.clear_cache();
        self.inner.cache.clear();
    }
}

impl Inner {
    fn compute(&self, request: &RecRequest, now: i64) -> anyhow::Result<Recommendations> {
        let pool = request.count.saturating_mul(self.config.pool_factor).max(1);

        let (entries, mut status) = match request.rec_type {
            RecType::Content => return self.compute_content(request),
            RecType::Collaborative => self.collaborative_entries(request, pool)?,
            RecType::Personalized => self.personalized_entries(request, now),
            RecType::Hybrid => self.hybrid_entries(request, pool, now)?,
        };

        let pipeline =
            SelectionPipeline::standard(self.config.quality_floor, self.config.genre_cap);
        let mut items = self.to_items(pipeline.run(entries, request.count));

        // Thin responses are topped up from the popularity ranking.
        if items.len() < request.count {
            let before = items.len();
            self.backfill_popular(&mut items, request.user_id, request.count, now);
            if items.len() > before {
                status = RecStatus::Fallback;
            }
        }
        if items.is_empty() {
            status = RecStatus::NoRecommendations;
        }

        Ok(Recommendations {
            rec_type: request.rec_type,
            status,
            items,
        })
    }

    /// Content similarity keeps its raw cosine ordering: the quality floor
    /// and diversity cap are about taste lists, not "more like this".
    fn compute_content(&self, request: &RecRequest) -> anyhow::Result<Recommendations> {
        let Some(movie_id) = request.movie_id else {
            return Ok(self.not_found(request.rec_type));
        };
        let anchor_title = match self.catalog.get_movie(movie_id) {
            Some(movie) => movie.title.clone(),
            None => return Ok(self.not_found(request.rec_type)),
        };

        let similar = match self.content.similar(movie_id, request.count) {
            Ok(similar) => similar,
            Err(err) if err.is_recoverable() => {
                return Ok(self.not_found(request.rec_type));
            }
            Err(err) => return Err(err.into()),
        };

        let items: Vec<RecItem> = similar
            .into_iter()
            .filter_map(|s| {
                let movie = self.catalog.get_movie(s.movie_id)?;
                Some(RecItem {
                    movie_id: s.movie_id,
                    title: movie.title.clone(),
                    score: s.score,
                    reasons: vec![format!("similar to {}", anchor_title)],
                })
            })
            .collect();

        let status = if items.is_empty() {
            RecStatus::NoRecommendations
        } else {
            RecStatus::Ok
        };
        Ok(Recommendations {
            rec_type: request.rec_type,
            status,
            items,
        })
    }

    fn collaborative_entries(
        &self,
        request: &RecRequest,
        pool: usize,
    ) -> anyhow::Result<(Vec<ScoreEntry>, RecStatus)> {
        let Some(user_id) = request.user_id else {
            return Ok((Vec::new(), RecStatus::Fallback));
        };
        let scored = self.recover(self.collab.recommend(user_id, pool))?;
        if scored.is_empty() {
            return Ok((Vec::new(), RecStatus::Fallback));
        }
        let entries = scored
            .iter()
            .filter_map(|s| {
                let movie = self.catalog.get_movie(s.movie_id)?;
                let mut entry = ScoreEntry::new(s.movie_id, s.score, movie.genres.clone());
                entry
                    .reasons
                    .push("predicted from viewers like you".to_string());
                Some(entry)
            })
            .collect();
        Ok((entries, RecStatus::Ok))
    }

    fn personalized_entries(
        &self,
        request: &RecRequest,
        now: i64,
    ) -> (Vec<ScoreEntry>, RecStatus) {
        let Some(user_id) = request.user_id else {
            return (Vec::new(), RecStatus::Fallback);
        };
        let profile = self.profiler.profile(user_id, now);
        // A blank profile has nothing to score against; hand the request
        // to the popularity backfill instead of ranking on metadata alone.
        if profile.total_events == 0
            && profile.avg_rating.is_none()
            && profile.genre_weights.is_empty()
        {
            return (Vec::new(), RecStatus::Fallback);
        }
        let candidates = self.unseen_movies(user_id);
        let entries =
            score_personalized(&self.catalog, &candidates, &profile, &self.config.personal);
        (entries, RecStatus::Ok)
    }

    fn hybrid_entries(
        &self,
        request: &RecRequest,
        pool: usize,
        now: i64,
    ) -> anyhow::Result<(Vec<ScoreEntry>, RecStatus)> {
        let Some(user_id) = request.user_id else {
            return Ok((Vec::new(), RecStatus::Fallback));
        };

        let collab_pool = self.recover(self.collab.recommend(user_id, pool))?;

        // Content candidates anchor on the explicit movie if given,
        // otherwise on the user's best-loved movie.
        let anchor = request.movie_id.or_else(|| self.top_rated_movie(user_id));
        let mut content_pool = match anchor {
            Some(anchor) => self.recover(self.content.similar(anchor, pool))?,
            None => Vec::new(),
        };
        // The collaborative pool is unseen by construction; hold the
        // content pool to the same rule.
        let rated: HashSet<MovieId> = self
            .catalog
            .ratings_for_user(user_id)
            .iter()
            .map(|r| r.movie_id)
            .collect();
        content_pool.retain(|s| !rated.contains(&s.movie_id));

        if collab_pool.is_empty() && content_pool.is_empty() {
            warn!("no hybrid candidates for user {}", user_id);
            return Ok((Vec::new(), RecStatus::Fallback));
        }

        let profile = self.profiler.profile(user_id, now);
        let popularity = self.popularity.scores(now);
        let entries = blend_hybrid(
            &self.catalog,
            &collab_pool,
            &content_pool,
            &profile,
            &popularity,
            &self.config.blend,
        );
        Ok((entries, RecStatus::Ok))
    }

    /// Absorb recoverable engine conditions into an empty pool.
    fn recover(&self, result: engines::Result<Vec<ScoredMovie>>) -> anyhow::Result<Vec<ScoredMovie>> {
        match result {
            Ok(scored) => Ok(scored),
            Err(err) if err.is_recoverable() => {
                debug!("engine degraded: {}", err);
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn backfill_popular(
        &self,
        items: &mut Vec<RecItem>,
        user_id: Option<UserId>,
        count: usize,
        now: i64,
    ) {
        let present: HashSet<MovieId> = items.iter().map(|i| i.movie_id).collect();
        let missing = count - items.len();
        // Over-fetch to survive the exclusion of already-selected movies.
        let fallback = self.popularity.fallback(user_id, count + present.len(), now);
        items.extend(
            fallback
                .into_iter()
                .filter(|s| !present.contains(&s.movie_id))
                .take(missing)
                .filter_map(|s| {
                    let movie = self.catalog.get_movie(s.movie_id)?;
                    Some(RecItem {
                        movie_id: s.movie_id,
                        title: movie.title.clone(),
                        score: s.score,
                        reasons: vec!["popular right now".to_string()],
                    })
                }),
        );
    }

    fn to_items(&self, entries: Vec<ScoreEntry>) -> Vec<RecItem> {
        entries
            .into_iter()
            .filter_map(|entry| {
                let movie = self.catalog.get_movie(entry.movie_id)?;
                Some(RecItem {
                    movie_id: entry.movie_id,
                    title: movie.title.clone(),
                    score: entry.score,
                    reasons: entry.reasons,
                })
            })
            .collect()
    }

    /// Movies the user has neither rated nor interacted with.
    fn unseen_movies(&self, user_id: UserId) -> Vec<MovieId> {
        let mut seen: HashSet<MovieId> = self
            .catalog
            .ratings_for_user(user_id)
            .iter()
            .map(|r| r.movie_id)
            .collect();
        seen.extend(
            self.catalog
                .events_for_user(user_id)
                .iter()
                .map(|e| e.movie_id),
        );
        self.catalog
            .movie_ids()
            .iter()
            .copied()
            .filter(|id| !seen.contains(id))
            .collect()
    }

    /// The user's highest-rated movie; latest rating wins a tie.
    fn top_rated_movie(&self, user_id: UserId) -> Option<MovieId> {
        self.catalog
            .ratings_for_user(user_id)
            .iter()
            .max_by(|a, b| {
                a.value
                    .total_cmp(&b.value)
                    .then(a.timestamp.cmp(&b.timestamp))
            })
            .map(|r| r.movie_id)
    }

    fn not_found(&self, rec_type: RecType) -> Recommendations {
        Recommendations {
            rec_type,
            status: RecStatus::NotFound,
            items: Vec::new(),
        }
    }
}
