//! Orchestration layer: wires the engines, ranking pipeline and caches
//! into a single [`Recommender`] facade the binaries talk to.

pub mod recommender;

pub use recommender::{
    RecItem, RecRequest, RecStatus, RecType, Recommendations, Recommender, RecommenderConfig,
    SimilarMovie,
};
