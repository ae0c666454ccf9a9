//! Reranker cascade: a fast cross-encoder pass over the top N1, then a
//! strong pass over the top N2.

use std::sync::Arc;

use betterspotlight_domain::ports::RerankBackend;
use betterspotlight_domain::Result;

use crate::retrieval::{sort_by_score, Candidate};

/// What the cascade did, for debug info.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub stage1_applied: bool,
    pub stage1_depth: usize,
    pub stage2_applied: bool,
    pub stage2_depth: usize,
}

/// Cascade configuration from settings.
#[derive(Debug, Clone, Copy)]
pub struct CascadeConfig {
    pub enabled: bool,
    pub stage1_max: usize,
    pub stage2_max: usize,
}

/// Run the cascade in place. Stage 1 runs whenever the cascade is enabled
/// and there are at least two candidates; stage 2 only after stage 1 and
/// with enough depth to reorder.
pub async fn run_cascade(
    candidates: &mut Vec<Candidate>,
    query: &str,
    fast: &Arc<dyn RerankBackend>,
    strong: &Arc<dyn RerankBackend>,
    config: CascadeConfig,
) -> Result<CascadeReport> {
    let mut report = CascadeReport::default();
    if !config.enabled || candidates.len() < 2 {
        return Ok(report);
    }

    let stage1_depth = config.stage1_max.min(candidates.len());
    rerank_top(candidates, query, fast, stage1_depth).await?;
    report.stage1_applied = true;
    report.stage1_depth = stage1_depth;

    let stage2_depth = config.stage2_max.min(candidates.len());
    if stage2_depth >= 2 {
        rerank_top(candidates, query, strong, stage2_depth).await?;
        report.stage2_applied = true;
        report.stage2_depth = stage2_depth;
    }

    Ok(report)
}

/// Blend rerank scores into the top `depth` candidates and re-sort.
async fn rerank_top(
    candidates: &mut Vec<Candidate>,
    query: &str,
    backend: &Arc<dyn RerankBackend>,
    depth: usize,
) -> Result<()> {
    let passages: Vec<String> = candidates[..depth]
        .iter()
        .map(|c| {
            if c.snippet.is_empty() {
                c.name.clone()
            } else {
                c.snippet.clone()
            }
        })
        .collect();
    let scores = backend.score(query, &passages).await?;

    let max_score = scores.iter().copied().fold(0f32, f32::max).max(1e-6);
    for (candidate, raw) in candidates[..depth].iter_mut().zip(&scores) {
        let normalized = f64::from(raw / max_score);
        candidate.score = 0.5 * candidate.score + 0.5 * normalized;
    }
    sort_by_score(candidates);
    Ok(())
}
