//! Dense-index bookkeeping: per-item labels and generation state.

use serde::{Deserialize, Serialize};

/// Mapping from an item to its label in the external dense index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMapEntry {
    pub item_id: i64,
    pub dense_label: i64,
    pub model_version: String,
    pub generation: i64,
    pub embedded_at: f64,
}

/// Generation state record. Rebuilds happen on a shadow generation and swap
/// atomically: the previous active version becomes the rollback version.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub active_version: i64,
    pub rollback_version: i64,
}
