//! Recommendation engines.
//!
//! Four independent score sources over a shared [`catalog::CatalogIndex`]:
//!
//! - [`content::ContentEngine`] - TF-IDF cosine similarity between movies
//! - [`collaborative::CollaborativeEngine`] - truncated-SVD latent factors
//!   with a TTL'd, single-flight model lifecycle
//! - [`profile::Profiler`] - derived per-user taste profiles
//! - [`popularity::PopularityEngine`] - windowed interaction-volume ranking
//!   and the fallback of last resort
//!
//! Engines return raw `(movie_id, score)` candidates; blending, filtering
//! and presentation live in the `ranking` and `server` crates.

pub mod cache;
pub mod collaborative;
pub mod content;
pub mod error;
pub mod popularity;
pub mod profile;
pub mod svd;

pub use cache::{CachePolicy, TtlCache};
pub use collaborative::{CollabConfig, CollaborativeEngine};
pub use content::ContentEngine;
pub use error::{EngineError, Result};
pub use popularity::{PopularityConfig, PopularityEngine};
pub use profile::{Profiler, UserProfile, WatchHourBucket};

use catalog::MovieId;
use serde::Serialize;

/// A candidate movie with an engine-specific score. Higher is better;
/// the scale is engine-defined and normalized later by the blender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredMovie {
    pub movie_id: MovieId,
    pub score: f32,
}
