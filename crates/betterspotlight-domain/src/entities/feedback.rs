//! Feedback log entries and derived frequency rows.

use serde::{Deserialize, Serialize};

/// User action recorded against a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Opened,
    Previewed,
    Dismissed,
}

impl FeedbackAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Previewed => "previewed",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::str::FromStr for FeedbackAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opened" => Ok(Self::Opened),
            "previewed" => Ok(Self::Previewed),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(()),
        }
    }
}

/// Aggregated per-item interaction counters, derived from feedback by the
/// periodic aggregator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyRow {
    pub open_count: i64,
    pub last_opened_at: Option<f64>,
    pub total_interactions: i64,
}
