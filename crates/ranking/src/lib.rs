//! Hybrid scoring and candidate selection.
//!
//! Turns raw engine candidate pools into a final ranked list: [`score`]
//! blends per-engine signals into [`score::ScoreEntry`]s, [`passes`] runs
//! them through the dedupe / quality-floor / diversity pipeline, and
//! [`context`] supplies the time-of-day genre mapping used by the
//! personalized scorer.

pub mod context;
pub mod passes;
pub mod score;

pub use passes::{Dedupe, DiversityCap, QualityFloor, SelectionPass, SelectionPipeline};
pub use score::{blend_hybrid, score_personalized, BlendWeights, PersonalWeights, ScoreEntry};
