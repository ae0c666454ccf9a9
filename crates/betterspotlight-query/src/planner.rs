//! Query planning: normalization, trailing type-token hints and the
//! typo-rewrite pass.

use betterspotlight_domain::constants::search::{
    FUZZY_REWRITE_MAX_CORRECTIONS, KNOWN_TYPE_TOKENS, STOPWORDS,
};
use betterspotlight_domain::value_objects::{QueryMode, SearchFilters};

/// Parsed query with planner-derived constraints.
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub cleaned_query: String,
    pub extracted_types: Vec<String>,
    pub filters: SearchFilters,
    pub has_type_hint: bool,
}

/// Collapse whitespace and trim.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive an optional type hint from a trailing known extension token
/// (e.g. "budget pdf" searches for "budget" constrained to pdf files).
#[must_use]
pub fn parse(normalized: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery {
        cleaned_query: normalized.trim().to_owned(),
        ..Default::default()
    };
    if parsed.cleaned_query.is_empty() {
        return parsed;
    }

    let mut tokens: Vec<&str> = parsed.cleaned_query.split(' ').collect();
    let Some(last) = tokens.last().map(|t| t.to_lowercase()) else {
        return parsed;
    };
    // A bare type token is a query, not a filter.
    if tokens.len() < 2 || !KNOWN_TYPE_TOKENS.contains(&last.as_str()) {
        return parsed;
    }

    parsed.extracted_types.push(last.clone());
    parsed.filters.file_types.push(last);
    parsed.has_type_hint = true;
    tokens.pop();
    parsed.cleaned_query = tokens.join(" ").trim().to_owned();
    parsed
}

/// Number of query tokens that are neither stopwords nor too short.
#[must_use]
pub fn meaningful_token_count(query: &str) -> usize {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .count()
}

/// Outcome of the typo-rewrite pass.
#[derive(Debug, Clone, Default)]
pub struct RewriteOutcome {
    pub query: String,
    pub applied: bool,
    pub reason: String,
    pub corrected_tokens: Vec<String>,
}

/// Rewrite likely typos against the corpus term dictionary.
///
/// Strict mode never rewrites. Auto mode corrects tokens of four or more
/// characters within edit distance 2 of a corpus term; relaxed mode also
/// considers shorter tokens. At most two tokens are corrected per query.
#[must_use]
pub fn rewrite(query: &str, mode: QueryMode, corpus_terms: &[String]) -> RewriteOutcome {
    let mut outcome = RewriteOutcome {
        query: query.to_owned(),
        ..Default::default()
    };
    if mode == QueryMode::Strict {
        outcome.reason = "strict_mode".to_owned();
        return outcome;
    }

    let max_distance = 2;
    let min_token_len = match mode {
        QueryMode::Relaxed => 3,
        _ => 4,
    };

    let mut corrected = Vec::new();
    let rewritten: Vec<String> = query
        .split(' ')
        .map(|token| {
            let lowered = token.to_lowercase();
            if lowered.len() < min_token_len
                || corrected.len() >= FUZZY_REWRITE_MAX_CORRECTIONS
                || corpus_terms.iter().any(|t| *t == lowered)
            {
                return token.to_owned();
            }
            let best = corpus_terms
                .iter()
                .filter(|t| t.len().abs_diff(lowered.len()) <= max_distance)
                .map(|t| (t, edit_distance(&lowered, t, max_distance)))
                .filter(|(_, d)| *d <= max_distance && *d > 0)
                .min_by_key(|(_, d)| *d);
            match best {
                Some((term, _)) => {
                    corrected.push(term.clone());
                    term.clone()
                }
                None => token.to_owned(),
            }
        })
        .collect();

    if !corrected.is_empty() {
        outcome.query = rewritten.join(" ");
        outcome.applied = true;
        outcome.reason = "typo_correction".to_owned();
        outcome.corrected_tokens = corrected;
    }
    outcome
}

/// Bounded Levenshtein distance; returns `bound + 1` when exceeded.
#[must_use]
pub fn edit_distance(a: &str, b: &str, bound: usize) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > bound {
        return bound + 1;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > bound {
            return bound + 1;
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
