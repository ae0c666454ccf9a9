//! Inference request envelope, worker roles and admission verdicts.

use serde::{Deserialize, Serialize};

/// Per-role worker lanes of the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    EmbedStrong,
    EmbedFast,
    RerankStrong,
    RerankFast,
    QaExtractive,
    RebuildEmbedStrong,
    RebuildEmbedFast,
}

impl Role {
    /// All roles, in worker start order.
    pub const ALL: [Role; 7] = [
        Role::EmbedStrong,
        Role::EmbedFast,
        Role::RerankStrong,
        Role::RerankFast,
        Role::QaExtractive,
        Role::RebuildEmbedStrong,
        Role::RebuildEmbedFast,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmbedStrong => "embed_strong",
            Self::EmbedFast => "embed_fast",
            Self::RerankStrong => "rerank_strong",
            Self::RerankFast => "rerank_fast",
            Self::QaExtractive => "qa_extractive",
            Self::RebuildEmbedStrong => "rebuild_embed_strong",
            Self::RebuildEmbedFast => "rebuild_embed_fast",
        }
    }

    /// Rebuild roles are served from the Rebuild lane.
    #[must_use]
    pub fn is_rebuild(self) -> bool {
        matches!(self, Self::RebuildEmbedStrong | Self::RebuildEmbedFast)
    }
}

/// Request envelope carried on every inference call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub cancel_token: Option<String>,
    pub trace_id: Option<String>,
    pub priority: Option<String>,
    /// Absolute wall-clock deadline in epoch milliseconds; 0 = none.
    pub deadline_ms: i64,
}

impl RequestEnvelope {
    /// True when the deadline has already passed.
    #[must_use]
    pub fn expired(&self, now_ms: i64) -> bool {
        self.deadline_ms > 0 && self.deadline_ms < now_ms
    }
}

/// Outcome of worker admission control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionVerdict {
    Accepted,
    /// Rejected with a reason (`worker_queue_full`, `global_live_queue_full`,
    /// `global_rebuild_queue_full`).
    Rejected(String),
}
