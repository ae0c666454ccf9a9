//! Search request/response value objects.

use serde::{Deserialize, Serialize};

use crate::entities::ItemKind;

/// How aggressively the query pipeline may rewrite the raw query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Strict,
    #[default]
    Auto,
    Relaxed,
}

impl QueryMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Auto => "auto",
            Self::Relaxed => "relaxed",
        }
    }
}

impl std::str::FromStr for QueryMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "auto" => Ok(Self::Auto),
            "relaxed" => Ok(Self::Relaxed),
            _ => Err(()),
        }
    }
}

/// Structured filters, merged from caller input and parser-derived
/// constraints, pushed down into the store query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub file_types: Vec<String>,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub modified_after: Option<f64>,
    pub modified_before: Option<f64>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
}

impl SearchFilters {
    /// True when no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_types.is_empty()
            && self.include_paths.is_empty()
            && self.exclude_paths.is_empty()
            && self.modified_after.is_none()
            && self.modified_before.is_none()
            && self.min_size.is_none()
            && self.max_size.is_none()
    }

    /// Union with parser-derived constraints. Scalars keep the tighter
    /// bound; lists are deduplicating unions.
    pub fn merge(&mut self, other: &SearchFilters) {
        for t in &other.file_types {
            if !self.file_types.contains(t) {
                self.file_types.push(t.clone());
            }
        }
        for p in &other.include_paths {
            if !self.include_paths.contains(p) {
                self.include_paths.push(p.clone());
            }
        }
        for p in &other.exclude_paths {
            if !self.exclude_paths.contains(p) {
                self.exclude_paths.push(p.clone());
            }
        }
        self.modified_after = merge_max(self.modified_after, other.modified_after);
        self.modified_before = merge_min_f(self.modified_before, other.modified_before);
        self.min_size = merge_max_i(self.min_size, other.min_size);
        self.max_size = merge_min_i(self.max_size, other.max_size);
    }
}

fn merge_max(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

fn merge_min_f(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

fn merge_max_i(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

fn merge_min_i(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

/// Raw FTS hit: id-level only, no item join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtsHit {
    pub file_id: i64,
    pub chunk_id: String,
    pub bm25_score: f64,
    pub snippet: String,
}

/// FTS hit joined with item metadata (filter pushdown applied).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedHit {
    pub item_id: i64,
    pub path: String,
    pub name: String,
    pub kind: ItemKind,
    pub extension: Option<String>,
    pub size: i64,
    pub modified_at: f64,
    pub is_pinned: bool,
    pub chunk_id: String,
    pub bm25_score: f64,
    pub snippet: String,
}
