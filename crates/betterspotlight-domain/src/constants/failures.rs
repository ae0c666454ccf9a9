//! Failure severity classification.
//!
//! Expected gaps are conditions outside our control (missing optional
//! extractor backend, cloud placeholder files, oversized or unreadable
//! inputs). They stay in the failures relation for troubleshooting but are
//! excluded from aggregate health.

/// Message prefixes classified as expected gaps.
pub const EXPECTED_GAP_PREFIXES: &[&str] = &[
    "PDF extraction unavailable (",
    "OCR extraction unavailable (",
    "Leptonica failed to read image",
];

/// Exact messages classified as expected gaps.
pub const EXPECTED_GAP_MESSAGES: &[&str] = &[
    "File does not exist or is not a regular file",
    "File is not readable",
    "Failed to load PDF document",
    "PDF is encrypted or password-protected",
    "File is a cloud placeholder and its content is not materialized",
];

/// LIKE-style pattern for the oversized-file message
/// (`File size <n> exceeds configured limit <m>`).
pub const EXPECTED_GAP_SIZE_PREFIX: &str = "File size ";
pub const EXPECTED_GAP_SIZE_MARKER: &str = " exceeds configured limit ";

/// The extraction stage name expected gaps are scoped to.
pub const STAGE_EXTRACTION: &str = "extraction";

/// True when a failure row counts as an expected gap rather than a defect.
#[must_use]
pub fn is_expected_gap(stage: &str, message: &str) -> bool {
    if stage != STAGE_EXTRACTION {
        return false;
    }
    if EXPECTED_GAP_MESSAGES.contains(&message) {
        return true;
    }
    if EXPECTED_GAP_PREFIXES.iter().any(|p| message.starts_with(p)) {
        return true;
    }
    message.starts_with(EXPECTED_GAP_SIZE_PREFIX) && message.contains(EXPECTED_GAP_SIZE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_gaps() {
        assert!(is_expected_gap(
            "extraction",
            "PDF extraction unavailable (poppler not found)"
        ));
        assert!(is_expected_gap(
            "extraction",
            "File size 209715200 exceeds configured limit 104857600"
        ));
        assert!(!is_expected_gap("extraction", "disk I/O error"));
        assert!(!is_expected_gap("write", "File is not readable"));
    }
}
