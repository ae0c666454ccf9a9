//! Native extractor: plain text, markdown and code read directly; formats
//! needing an optional backend (PDF, images) report expected gaps so index
//! health stays clean.

use std::path::Path;

use async_trait::async_trait;
use betterspotlight_domain::entities::ItemKind;
use betterspotlight_domain::ports::{ContentExtractor, ExtractionOutcome};
use betterspotlight_domain::Result;

/// Extractor for content types that need no external backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeExtractor;

impl NativeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn classify(path: &Path) -> ItemKind {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .map_or(ItemKind::Binary, |ext| ItemKind::from_extension(&ext))
    }
}

#[async_trait]
impl ContentExtractor for NativeExtractor {
    async fn extract(&self, path: &Path, max_bytes: i64) -> Result<ExtractionOutcome> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(_) => {
                return Ok(ExtractionOutcome::ExpectedGap(
                    "File does not exist or is not a regular file".to_owned(),
                ));
            }
        };
        if !metadata.is_file() {
            return Ok(ExtractionOutcome::ExpectedGap(
                "File does not exist or is not a regular file".to_owned(),
            ));
        }
        if max_bytes > 0 && metadata.len() as i64 > max_bytes {
            return Ok(ExtractionOutcome::ExpectedGap(format!(
                "File size {} exceeds configured limit {}",
                metadata.len(),
                max_bytes
            )));
        }

        match Self::classify(path) {
            ItemKind::Pdf => Ok(ExtractionOutcome::ExpectedGap(
                "PDF extraction unavailable (no backend configured)".to_owned(),
            )),
            ItemKind::Image => Ok(ExtractionOutcome::ExpectedGap(
                "OCR extraction unavailable (no backend configured)".to_owned(),
            )),
            ItemKind::Binary => Ok(ExtractionOutcome::Text(String::new())),
            ItemKind::Text | ItemKind::Markdown | ItemKind::Code => {
                let bytes = match tokio::fs::read(path).await {
                    Ok(b) => b,
                    Err(_) => {
                        return Ok(ExtractionOutcome::ExpectedGap(
                            "File is not readable".to_owned(),
                        ));
                    }
                };
                // A sized file that reads back empty is a cloud sync stub.
                if bytes.is_empty() && metadata.len() > 0 {
                    return Ok(ExtractionOutcome::ExpectedGap(
                        "File is a cloud placeholder and its content is not materialized"
                            .to_owned(),
                    ));
                }
                match String::from_utf8(bytes) {
                    Ok(text) => Ok(ExtractionOutcome::Text(text)),
                    Err(e) => {
                        let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
                        Ok(ExtractionOutcome::Text(text))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello extraction").unwrap();

        let outcome = NativeExtractor::new().extract(&path, 0).await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::Text("hello extraction".to_owned()));
    }

    #[tokio::test]
    async fn missing_file_is_an_expected_gap() {
        let outcome = NativeExtractor::new()
            .extract(Path::new("/definitely/not/here.txt"), 0)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::ExpectedGap(msg) if msg.contains("does not exist")
        ));
    }

    #[tokio::test]
    async fn oversized_file_reports_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let outcome = NativeExtractor::new().extract(&path, 4).await.unwrap();
        match outcome {
            ExtractionOutcome::ExpectedGap(msg) => {
                assert!(msg.contains("exceeds configured limit 4"), "got: {msg}");
            }
            other => panic!("expected gap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pdf_without_backend_is_an_expected_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let outcome = NativeExtractor::new().extract(&path, 0).await.unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::ExpectedGap(msg) if msg.starts_with("PDF extraction unavailable (")
        ));
    }
}
