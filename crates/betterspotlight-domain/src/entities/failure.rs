//! Per-(item, stage) failure records.

use serde::{Deserialize, Serialize};

use crate::constants::failures;

/// Failure severity. Expected gaps never degrade aggregate health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Critical,
    ExpectedGap,
}

impl FailureSeverity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::ExpectedGap => "expected_gap",
        }
    }

    /// Classify a stored failure row.
    #[must_use]
    pub fn classify(stage: &str, message: &str) -> Self {
        if failures::is_expected_gap(stage, message) {
            Self::ExpectedGap
        } else {
            Self::Critical
        }
    }
}

/// One failure row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub item_id: i64,
    pub item_path: Option<String>,
    pub stage: String,
    pub message: String,
    pub failure_count: i64,
    pub first_failed_at: f64,
    pub last_failed_at: f64,
}

impl FailureRecord {
    /// Severity of this row.
    #[must_use]
    pub fn severity(&self) -> FailureSeverity {
        FailureSeverity::classify(&self.stage, &self.message)
    }
}
