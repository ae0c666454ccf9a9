//! Online-ranker rollout policy and persisted learning state.

use serde::{Deserialize, Serialize};

/// Rollout mode for the personalization ranker. Ordered: later modes allow
/// strictly more (training, then serving).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutMode {
    InstrumentationOnly,
    ShadowTraining,
    BlendedRanking,
}

impl RolloutMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstrumentationOnly => "instrumentation_only",
            Self::ShadowTraining => "shadow_training",
            Self::BlendedRanking => "blended_ranking",
        }
    }

    /// Training is permitted at `shadow_training` and above.
    #[must_use]
    pub fn allows_training(self) -> bool {
        self >= Self::ShadowTraining
    }

    /// Serving is permitted only at `blended_ranking`.
    #[must_use]
    pub fn allows_serving(self) -> bool {
        self >= Self::BlendedRanking
    }
}

impl std::str::FromStr for RolloutMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instrumentation_only" => Ok(Self::InstrumentationOnly),
            "shadow_training" => Ok(Self::ShadowTraining),
            "blended_ranking" => Ok(Self::BlendedRanking),
            _ => Err(()),
        }
    }
}

/// Which scoring backend is active for a learned model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningBackend {
    None,
    NativeSgd,
    PlatformAccelerated,
}

impl LearningBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NativeSgd => "native_sgd",
            Self::PlatformAccelerated => "platform_accelerated",
        }
    }
}

impl std::str::FromStr for LearningBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "native_sgd" => Ok(Self::NativeSgd),
            "platform_accelerated" => Ok(Self::PlatformAccelerated),
            _ => Err(()),
        }
    }
}

/// Outcome of a training cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Succeeded,
    Rejected,
    Failed,
}

impl CycleStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Persisted learning model state, keyed by model name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningModelState {
    pub name: String,
    pub active_version: i64,
    pub rollback_version: i64,
    pub active_backend: LearningBackend,
    pub last_cycle_status: String,
    pub last_cycle_reason: String,
    pub cycles_run: i64,
    pub promotions: i64,
    pub rejections: i64,
}

impl LearningModelState {
    /// Fresh state for a model that has never trained.
    #[must_use]
    pub fn fresh(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            active_version: 0,
            rollback_version: 0,
            active_backend: LearningBackend::None,
            last_cycle_status: String::new(),
            last_cycle_reason: String::new(),
            cycles_run: 0,
            promotions: 0,
            rejections: 0,
        }
    }
}

/// One entry of the recent-cycles ring buffer (newest first, monotone
/// non-increasing `cycle_index`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub cycle_index: i64,
    pub status: CycleStatus,
    pub reason: String,
    pub examples_used: i64,
    pub loss: f64,
    pub eval_score: f64,
    pub completed_at: f64,
}
