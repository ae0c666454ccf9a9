//! Core domain entities.

pub mod behavior;
pub mod chunk;
pub mod failure;
pub mod feedback;
pub mod item;
pub mod learning;
pub mod vector;

pub use behavior::{BehaviorEvent, BehaviorEventType, PrivacyFlags, TrainingExample};
pub use chunk::Chunk;
pub use failure::{FailureRecord, FailureSeverity};
pub use feedback::{FeedbackAction, FrequencyRow};
pub use item::{Item, ItemKind, NewItem};
pub use learning::{CycleRecord, CycleStatus, LearningBackend, LearningModelState, RolloutMode};
pub use vector::{GenerationState, VectorMapEntry};
