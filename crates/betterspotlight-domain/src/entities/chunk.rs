//! Ordered text segments of an item.

use serde::{Deserialize, Serialize};

use crate::utils::id;

/// One text segment. `chunk_id` is deterministic (hash of path and index)
/// so the content relation and the inverted index always agree on identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: i32,
    pub text: String,
}

impl Chunk {
    /// Build a chunk for `path` at `chunk_index`.
    #[must_use]
    pub fn new(path: &str, chunk_index: i32, text: String) -> Self {
        Self {
            chunk_id: id::chunk_id(path, chunk_index),
            chunk_index,
            text,
        }
    }
}
