//! Health snapshot value objects.

use serde::{Deserialize, Serialize};

/// Where queue depth information came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSource {
    #[default]
    Unavailable,
    IndexerRpc,
}

impl QueueSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::IndexerRpc => "indexer_rpc",
        }
    }
}

/// Advisory for the GUI about retrieval coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalAdvisory {
    RootFanoutRecommended,
    CuratedRootsRecommended,
}

impl RetrievalAdvisory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RootFanoutRecommended => "root_fanout_recommended",
            Self::CuratedRootsRecommended => "curated_roots_recommended",
        }
    }
}

/// Store-level index health, derived by O(1) queries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    pub total_indexed_items: i64,
    pub total_chunks: i64,
    /// Failures excluding expected gaps.
    pub total_failures: i64,
    pub items_without_content: i64,
    /// Approximated by page_count * page_size.
    pub fts_index_size: i64,
    pub last_index_time: f64,
    pub index_age: f64,
    pub is_healthy: bool,
}
