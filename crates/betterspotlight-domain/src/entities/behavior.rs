//! Behavior events and training examples for the learning layer.

use serde::{Deserialize, Serialize};

/// Behavior event type. Only positive signals generate training examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorEventType {
    ResultOpen,
    ResultPreview,
    Dwell,
}

impl BehaviorEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResultOpen => "result_open",
            Self::ResultPreview => "result_preview",
            Self::Dwell => "dwell",
        }
    }

    /// Positive signals attribute a label-1 training example.
    #[must_use]
    pub fn is_positive(self) -> bool {
        matches!(self, Self::ResultOpen)
    }
}

impl std::str::FromStr for BehaviorEventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "result_open" => Ok(Self::ResultOpen),
            "result_preview" => Ok(Self::ResultPreview),
            "dwell" => Ok(Self::Dwell),
            _ => Err(()),
        }
    }
}

/// Privacy flags attached by the capture layer. An event with any flag set
/// is never recorded or attributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacyFlags {
    pub secure_input: bool,
    pub private_context: bool,
    pub denylisted_app: bool,
    pub redacted: bool,
}

impl PrivacyFlags {
    /// True when any flag excludes this event from learning.
    #[must_use]
    pub fn any(self) -> bool {
        self.secure_input || self.private_context || self.denylisted_app || self.redacted
    }
}

/// A behavior event as ingested over IPC. `event_id` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    pub event_id: String,
    pub event_type: BehaviorEventType,
    #[serde(default)]
    pub source: String,
    pub timestamp: f64,
    #[serde(default)]
    pub item_id: Option<i64>,
    #[serde(default)]
    pub item_path: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub app_bundle_id: Option<String>,
    #[serde(default)]
    pub context_event_id: Option<String>,
    #[serde(default)]
    pub activity_digest: Option<String>,
    #[serde(default)]
    pub attribution_confidence: f64,
    #[serde(default)]
    pub privacy_flags: PrivacyFlags,
}

/// A labeled training example derived from behavior events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingExample {
    pub sample_id: String,
    pub query: String,
    pub item_id: i64,
    pub features: serde_json::Value,
    pub label: i32,
    pub weight: f64,
    pub attribution_confidence: f64,
    pub consumed: bool,
    pub created_at: f64,
}
