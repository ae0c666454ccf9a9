//! Personalization/learning layer: behavior attribution, training-example
//! accumulation, the cycle scheduler, promotion gates and the online
//! ranker blend.

pub mod engine;
pub mod gates;
pub mod ranker;

pub use engine::{LearningEngine, LearningSettings};
pub use ranker::{OnlineRanker, TrainingMetrics, FEATURE_KEYS};
