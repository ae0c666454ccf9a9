//! Port traits: the seams the core consumes.
//!
//! External collaborators (file-format extractors, the dense-index library,
//! model backends) are specified only by these interfaces. Services receive
//! `Arc<dyn Port>` implementations through their constructors.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of a content extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Extracted plain text, ready for chunking.
    Text(String),
    /// Content not available for a documented, non-defect reason. The
    /// message must match an expected-gap pattern so health stays clean.
    ExpectedGap(String),
}

/// Extracts plain text from a file. Format-specific backends (PDF, OCR)
/// live behind this seam.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extract text from `path`, honoring the byte cap.
    async fn extract(&self, path: &Path, max_bytes: i64) -> Result<ExtractionOutcome>;
}

/// A dense vector index generation. Labels are assigned by the caller and
/// mapped to items through the store's vector map.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Insert or replace a labeled vector.
    async fn insert(&self, label: i64, vector: Vec<f32>) -> Result<()>;

    /// Remove a labeled vector. Unknown labels are a no-op.
    async fn remove(&self, label: i64) -> Result<()>;

    /// K-nearest search; returns `(label, similarity)` pairs, best first.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(i64, f32)>>;

    /// Number of vectors currently in the index.
    async fn len(&self) -> usize;

    /// Persist the index to `path`.
    async fn persist(&self, path: &Path) -> Result<()>;
}

/// Produces dense embeddings for queries and passages.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embedding dimensionality.
    fn dims(&self) -> usize;

    /// Model identifier reported in health/results.
    fn model_id(&self) -> &str;

    /// Embed a batch of texts. Output vectors are unit-normalized.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Cross-encoder relevance scoring.
#[async_trait]
pub trait RerankBackend: Send + Sync {
    /// Model identifier reported in health/results.
    fn model_id(&self) -> &str;

    /// Score each passage against the query; higher is more relevant.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// An extractive answer span.
#[derive(Debug, Clone, PartialEq)]
pub struct QaSpan {
    pub text: String,
    pub confidence: f64,
    pub passage_index: usize,
}

/// Extractive question answering over candidate passages.
#[async_trait]
pub trait QaBackend: Send + Sync {
    /// Model identifier reported in health/results.
    fn model_id(&self) -> &str;

    /// Best answer span above the model's score floor, if any.
    async fn extract(&self, query: &str, passages: &[String]) -> Result<Option<QaSpan>>;
}
