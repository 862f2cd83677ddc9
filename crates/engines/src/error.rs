//! Error taxonomy shared by all recommendation engines.
//!
//! Domain-expected conditions (unknown IDs, thin history) are modeled as
//! variants the hybrid scorer absorbs into fallback strategies; only
//! `Internal` represents a genuinely unexpected fault that propagates.

use thiserror::Error;

/// Errors produced by the recommendation engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown movie or user. Recovered via fallback, never surfaced as a
    /// failure to callers.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u32 },

    /// Too few ratings or events to produce a reliable signal. The hybrid
    /// scorer consumes this to pick a fallback strategy.
    #[error("insufficient data for user {user_id}: {have} ratings, need {need}")]
    InsufficientData {
        user_id: u32,
        have: usize,
        need: usize,
    },

    /// No model could be built at all (e.g. a catalog with zero ratings).
    #[error("no model available: {0}")]
    EmptyModel(String),

    /// Genuinely unexpected fault: corrupted matrix, dimension mismatch.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the hybrid scorer should absorb this into a fallback rather
    /// than propagating it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Internal(_))
    }
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
