//! Inference core: per-role worker lanes with admission control, a
//! supervisor actor governing restart/backoff, and deterministic native
//! model backends.

pub mod backends;
pub mod service;
pub mod supervisor_actor;
pub mod worker;

pub use backends::{HashingEmbedder, OverlapReranker, SpanQa};
pub use service::InferenceService;
pub use supervisor_actor::{InferenceSupervisorActor, RecoveryDecision};
