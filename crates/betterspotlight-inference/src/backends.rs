//! Native model backends. Real model formats are external collaborators;
//! these are the deterministic in-process fallbacks the core always has.

use async_trait::async_trait;
use betterspotlight_domain::ports::{EmbeddingBackend, QaBackend, QaSpan, RerankBackend};
use betterspotlight_domain::Result;
use sha2::{Digest, Sha256};

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_owned)
        .collect()
}

/// Feature-hashing embedder: each token is hashed into a handful of
/// dimensions with alternating sign, then the vector is unit-normalized.
/// Deterministic, so identical text always lands on the same point.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model_id: String,
    dims: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(model_id: &str, dims: usize) -> Self {
        Self {
            model_id: model_id.to_owned(),
            dims: dims.max(8),
        }
    }

    /// Synchronous core used by the worker threads.
    #[must_use]
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            for pair in digest.chunks_exact(4).take(4) {
                let raw = u32::from_be_bytes([pair[0], pair[1], pair[2], pair[3]]);
                let dim = (raw as usize) % self.dims;
                let sign = if raw & 1 == 0 { 1.0 } else { -1.0 };
                vector[dim] += sign;
            }
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Token-overlap reranker: scores passages by weighted query-term overlap
/// with a length penalty. A stand-in for the cross-encoder seam.
#[derive(Debug, Clone)]
pub struct OverlapReranker {
    model_id: String,
}

impl OverlapReranker {
    #[must_use]
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_owned(),
        }
    }

    /// Synchronous core used by the worker threads.
    #[must_use]
    pub fn score_one(&self, query_tokens: &[String], passage: &str) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let passage_tokens = tokenize(passage);
        if passage_tokens.is_empty() {
            return 0.0;
        }
        let mut matched = 0usize;
        for token in query_tokens {
            if passage_tokens.iter().any(|p| p == token) {
                matched += 1;
            }
        }
        let coverage = matched as f32 / query_tokens.len() as f32;
        let brevity = 1.0 / (1.0 + (passage_tokens.len() as f32 / 256.0));
        coverage * 0.8 + coverage * brevity * 0.2
    }
}

#[async_trait]
impl RerankBackend for OverlapReranker {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let query_tokens = tokenize(query);
        Ok(passages
            .iter()
            .map(|p| self.score_one(&query_tokens, p))
            .collect())
    }
}

/// Extractive QA: picks the sentence with the densest query-term overlap
/// across the candidate passages, with a score floor below which there is
/// no answer.
#[derive(Debug, Clone)]
pub struct SpanQa {
    model_id: String,
    score_floor: f64,
}

impl SpanQa {
    #[must_use]
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_owned(),
            score_floor: 0.34,
        }
    }

    /// Synchronous core used by the worker threads.
    #[must_use]
    pub fn extract_span(&self, query: &str, passages: &[String]) -> Option<QaSpan> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return None;
        }

        let mut best: Option<QaSpan> = None;
        for (passage_index, passage) in passages.iter().enumerate() {
            for sentence in passage
                .split(['.', '\n', '!', '?'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                let sentence_tokens = tokenize(sentence);
                if sentence_tokens.is_empty() {
                    continue;
                }
                let matched = query_tokens
                    .iter()
                    .filter(|t| sentence_tokens.iter().any(|s| s == *t))
                    .count();
                let confidence = matched as f64 / query_tokens.len() as f64;
                if confidence < self.score_floor {
                    continue;
                }
                if best.as_ref().is_none_or(|b| confidence > b.confidence) {
                    best = Some(QaSpan {
                        text: sentence.to_owned(),
                        confidence: confidence.min(1.0),
                        passage_index,
                    });
                }
            }
        }
        best
    }
}

#[async_trait]
impl QaBackend for SpanQa {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn extract(&self, query: &str, passages: &[String]) -> Result<Option<QaSpan>> {
        Ok(self.extract_span(query, passages))
    }
}
