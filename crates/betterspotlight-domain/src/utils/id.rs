//! Deterministic ids and content hashes.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of arbitrary bytes.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Deterministic chunk id: hash of `path` and the 0-based chunk index.
/// Stable across re-indexing runs so the FTS relation and the content
/// relation always agree on chunk identity.
#[must_use]
pub fn chunk_id(path: &str, chunk_index: i32) -> String {
    sha256_hex(format!("{path}:{chunk_index}").as_bytes())
}

/// Content hash for change detection.
#[must_use]
pub fn content_hash(text: &str) -> String {
    sha256_hex(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let a = chunk_id("/doc/report.txt", 0);
        let b = chunk_id("/doc/report.txt", 0);
        let c = chunk_id("/doc/report.txt", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
