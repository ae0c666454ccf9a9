//! Candidate generation and merge: lexical + semantic with adaptive
//! weights, semantic-only admission safety, frequency/pinned boosts and
//! clipboard-context boosts.

use std::collections::HashMap;

use betterspotlight_domain::constants::search::{
    MERGE_WEIGHT_LEXICAL_ADAPTIVE, MERGE_WEIGHT_LEXICAL_DEFAULT, MERGE_WEIGHT_SEMANTIC_ADAPTIVE,
    MERGE_WEIGHT_SEMANTIC_DEFAULT,
};
use betterspotlight_domain::entities::{FrequencyRow, ItemKind};
use betterspotlight_domain::value_objects::JoinedHit;

/// One merged candidate before reranking/personalization.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item_id: i64,
    pub path: String,
    pub name: String,
    pub kind: ItemKind,
    pub is_pinned: bool,
    pub chunk_id: Option<String>,
    pub snippet: String,
    pub lexical_score: f64,
    pub semantic_score: f64,
    pub score: f64,
}

/// Weights used for one merge; always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeWeights {
    pub lexical: f64,
    pub semantic: f64,
}

impl MergeWeights {
    /// Default weights, or the adaptive branch for natural-language
    /// queries (three or more meaningful tokens and no type hint).
    #[must_use]
    pub fn select(meaningful_tokens: usize, has_type_hint: bool) -> (Self, bool) {
        if meaningful_tokens >= 3 && !has_type_hint {
            (
                Self {
                    lexical: MERGE_WEIGHT_LEXICAL_ADAPTIVE,
                    semantic: MERGE_WEIGHT_SEMANTIC_ADAPTIVE,
                },
                true,
            )
        } else {
            (
                Self {
                    lexical: MERGE_WEIGHT_LEXICAL_DEFAULT,
                    semantic: MERGE_WEIGHT_SEMANTIC_DEFAULT,
                },
                false,
            )
        }
    }
}

/// Tally of the semantic-only admission decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticAdmission {
    pub admitted: usize,
    pub suppressed: usize,
}

/// Merge lexical hits with `(item_id, similarity)` semantic candidates.
///
/// Lexical scores are normalized by rank position (BM25 rank order is
/// already best-first). Semantic-only candidates are admitted only above
/// `semantic_only_threshold`; the rest are counted as suppressed.
#[must_use]
pub fn merge_candidates(
    lexical: &[JoinedHit],
    semantic: &[(i64, f32)],
    item_meta: &HashMap<i64, JoinedHit>,
    weights: MergeWeights,
    semantic_only_threshold: f64,
) -> (Vec<Candidate>, SemanticAdmission) {
    let mut by_item: HashMap<i64, Candidate> = HashMap::new();
    let lexical_len = lexical.len().max(1);

    for (rank, hit) in lexical.iter().enumerate() {
        let lexical_score = 1.0 - rank as f64 / lexical_len as f64;
        let entry = by_item.entry(hit.item_id).or_insert_with(|| Candidate {
            item_id: hit.item_id,
            path: hit.path.clone(),
            name: hit.name.clone(),
            kind: hit.kind,
            is_pinned: hit.is_pinned,
            chunk_id: Some(hit.chunk_id.clone()),
            snippet: hit.snippet.clone(),
            lexical_score: 0.0,
            semantic_score: 0.0,
            score: 0.0,
        });
        // Multiple chunk hits for one item keep the best rank.
        entry.lexical_score = entry.lexical_score.max(lexical_score);
    }

    let mut admission = SemanticAdmission::default();
    for (item_id, similarity) in semantic {
        let similarity = f64::from(*similarity).clamp(0.0, 1.0);
        if let Some(entry) = by_item.get_mut(item_id) {
            entry.semantic_score = entry.semantic_score.max(similarity);
            continue;
        }
        // Semantic-only candidate: admit only above the safety threshold.
        if similarity < semantic_only_threshold {
            admission.suppressed += 1;
            continue;
        }
        let Some(meta) = item_meta.get(item_id) else {
            admission.suppressed += 1;
            continue;
        };
        admission.admitted += 1;
        by_item.insert(
            *item_id,
            Candidate {
                item_id: *item_id,
                path: meta.path.clone(),
                name: meta.name.clone(),
                kind: meta.kind,
                is_pinned: meta.is_pinned,
                chunk_id: None,
                snippet: String::new(),
                lexical_score: 0.0,
                semantic_score: similarity,
                score: 0.0,
            },
        );
    }

    let mut candidates: Vec<Candidate> = by_item
        .into_values()
        .map(|mut c| {
            c.score = weights.lexical * c.lexical_score + weights.semantic * c.semantic_score;
            c
        })
        .collect();
    sort_by_score(&mut candidates);
    (candidates, admission)
}

/// Frequency and pinned boosts from the interactions-derived counters.
pub fn apply_frequency_boosts(
    candidates: &mut [Candidate],
    frequencies: &HashMap<i64, FrequencyRow>,
) {
    for candidate in candidates.iter_mut() {
        if let Some(freq) = frequencies.get(&candidate.item_id) {
            candidate.score += 0.05 * (1.0 + freq.open_count as f64).ln();
        }
        if candidate.is_pinned {
            candidate.score += 0.10;
        }
    }
}

/// Clipboard-context hints from the caller. Only path-derived hints are
/// matched; the raw clipboard text is never stored.
#[derive(Debug, Clone, Default)]
pub struct ClipboardHints {
    pub basename: Option<String>,
    pub dirname: Option<String>,
    pub extension: Option<String>,
}

impl ClipboardHints {
    /// How many hint fields the caller supplied.
    #[must_use]
    pub fn provided(&self) -> usize {
        usize::from(self.basename.is_some())
            + usize::from(self.dirname.is_some())
            + usize::from(self.extension.is_some())
    }
}

/// Boost candidates whose path matches clipboard hints. Returns the number
/// of boosted results.
pub fn apply_clipboard_boosts(candidates: &mut [Candidate], hints: &ClipboardHints) -> usize {
    if hints.provided() == 0 {
        return 0;
    }
    let mut boosted = 0;
    for candidate in candidates.iter_mut() {
        let mut matched = false;
        if let Some(basename) = &hints.basename {
            if candidate.name.eq_ignore_ascii_case(basename) {
                candidate.score += 0.08;
                matched = true;
            }
        }
        if let Some(dirname) = &hints.dirname {
            if candidate.path.starts_with(dirname.as_str()) {
                candidate.score += 0.05;
                matched = true;
            }
        }
        if let Some(extension) = &hints.extension {
            if candidate
                .path
                .rsplit('.')
                .next()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            {
                candidate.score += 0.02;
                matched = true;
            }
        }
        if matched {
            boosted += 1;
        }
    }
    boosted
}

/// Stable best-first ordering.
pub fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}
