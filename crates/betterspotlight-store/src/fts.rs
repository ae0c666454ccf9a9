//! FTS5 search: query sanitizers and the search surface.

use betterspotlight_domain::constants::search::{
    RELAXED_MAX_TOKENS, RELAXED_WILDCARD_MIN_LEN, STOPWORDS,
};
use betterspotlight_domain::entities::ItemKind;
use betterspotlight_domain::value_objects::{FtsHit, JoinedHit, SearchFilters};
use betterspotlight_domain::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use crate::store::SqliteStore;

/// Strict sanitizer: strips wildcard/anchor/colon/paren characters,
/// lowercases boolean operators inside free text, preserves quoted phrases
/// unless the quotes are unbalanced, and collapses whitespace.
#[must_use]
pub fn sanitize_fts_query_strict(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let quote_count = trimmed.chars().filter(|c| *c == '"').count();
    let strip_quotes = quote_count % 2 != 0;

    let stripped: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '*' | '^' | ':' | '(' | ')') && !(strip_quotes && *c == '"'))
        .collect();

    let chars: Vec<char> = stripped.chars().collect();
    let mut normalized = String::with_capacity(stripped.len());
    let mut in_quote = false;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            in_quote = !in_quote;
            normalized.push(ch);
            i += 1;
            continue;
        }
        if !in_quote && (ch.is_alphanumeric() || ch == '_') {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let token: String = chars[start..i].iter().collect();
            match token.as_str() {
                "OR" => normalized.push_str("or"),
                "NOT" => normalized.push_str("not"),
                "AND" => normalized.push_str("and"),
                "NEAR" => normalized.push_str("near"),
                _ => normalized.push_str(&token),
            }
            continue;
        }
        normalized.push(ch);
        i += 1;
    }

    let mut compact = String::with_capacity(normalized.len());
    let mut last_was_space = false;
    for ch in normalized.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                compact.push(' ');
                last_was_space = true;
            }
            continue;
        }
        compact.push(ch);
        last_was_space = false;
    }
    compact.trim().to_owned()
}

/// Relaxed sanitizer: a stopword-filtered disjunction of lowercased terms
/// with a prefix wildcard on tokens of four or more characters, capped at
/// eight tokens.
#[must_use]
pub fn sanitize_fts_query_relaxed(raw: &str) -> String {
    let normalized = raw.to_lowercase();
    let mut tokens: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let mut current = String::new();
    let mut chars = normalized.chars().chain(std::iter::once(' '));
    loop {
        let Some(ch) = chars.next() else { break };
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            current.push(ch);
            continue;
        }
        if !current.is_empty() {
            let token = std::mem::take(&mut current);
            if token.len() >= 2 && !STOPWORDS.contains(&token.as_str()) && !seen.contains(&token) {
                seen.push(token.clone());
                if token.len() >= RELAXED_WILDCARD_MIN_LEN {
                    tokens.push(format!("{token}*"));
                } else {
                    tokens.push(token);
                }
                if tokens.len() >= RELAXED_MAX_TOKENS {
                    break;
                }
            }
        }
    }

    tokens.join(" OR ")
}

fn joined_hit_from_row(row: &SqliteRow) -> JoinedHit {
    let kind_str: String = row.try_get("kind").unwrap_or_default();
    JoinedHit {
        item_id: row.try_get("item_id").unwrap_or(0),
        path: row.try_get("path").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        kind: kind_str.parse::<ItemKind>().unwrap_or(ItemKind::Binary),
        extension: row.try_get("extension").ok(),
        size: row.try_get("size").unwrap_or(0),
        modified_at: row.try_get("modified_at").unwrap_or(0.0),
        is_pinned: row.try_get::<i64, _>("is_pinned").unwrap_or(0) != 0,
        chunk_id: row.try_get("chunk_id").unwrap_or_default(),
        bm25_score: row.try_get("rank").unwrap_or(0.0),
        snippet: row.try_get("snip").unwrap_or_default(),
    }
}

/// Append pushed-down filter predicates against the joined `i` item row.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &SearchFilters) {
    if !filters.file_types.is_empty() {
        builder.push(" AND lower(coalesce(i.extension, '')) IN (");
        let mut separated = builder.separated(", ");
        for ext in &filters.file_types {
            separated.push_bind(ext.to_lowercase());
        }
        builder.push(")");
    }
    if !filters.include_paths.is_empty() {
        builder.push(" AND (");
        for (idx, prefix) in filters.include_paths.iter().enumerate() {
            if idx > 0 {
                builder.push(" OR ");
            }
            builder.push("i.path LIKE ");
            builder.push_bind(format!("{prefix}%"));
        }
        builder.push(")");
    }
    for prefix in &filters.exclude_paths {
        builder.push(" AND i.path NOT LIKE ");
        builder.push_bind(format!("{prefix}%"));
    }
    if let Some(after) = filters.modified_after {
        builder.push(" AND i.modified_at >= ");
        builder.push_bind(after);
    }
    if let Some(before) = filters.modified_before {
        builder.push(" AND i.modified_at <= ");
        builder.push_bind(before);
    }
    if let Some(min) = filters.min_size {
        builder.push(" AND i.size >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filters.max_size {
        builder.push(" AND i.size <= ");
        builder.push_bind(max);
    }
}

impl SqliteStore {
    /// Raw FTS search, id-level hits with BM25 score and a highlighted
    /// snippet. A query reduced to empty by the sanitizer returns an empty
    /// result without touching the index.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn search_fts(&self, query: &str, limit: i64, relaxed: bool) -> Result<Vec<FtsHit>> {
        let sanitized = if relaxed {
            sanitize_fts_query_relaxed(query)
        } else {
            sanitize_fts_query_strict(query)
        };
        if sanitized.is_empty() {
            debug!("FTS search skipped after sanitization");
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT file_id, chunk_id, rank,
                    snippet(search_index, 2, '<b>', '</b>', '...', 32) AS snip
             FROM search_index
             WHERE search_index MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )
        .bind(&sanitized)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("fts search failed", e))?;

        Ok(rows
            .iter()
            .map(|row| FtsHit {
                file_id: row.try_get("file_id").unwrap_or(0),
                chunk_id: row.try_get("chunk_id").unwrap_or_default(),
                bm25_score: row.try_get("rank").unwrap_or(0.0),
                snippet: row.try_get("snip").unwrap_or_default(),
            })
            .collect())
    }

    /// FTS search joined with item metadata and filter pushdown.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn search_fts_joined(
        &self,
        query: &str,
        limit: i64,
        relaxed: bool,
        filters: &SearchFilters,
    ) -> Result<Vec<JoinedHit>> {
        let sanitized = if relaxed {
            sanitize_fts_query_relaxed(query)
        } else {
            sanitize_fts_query_strict(query)
        };
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT i.id AS item_id, i.path, i.name, i.kind, i.extension, i.size,
                    i.modified_at, i.is_pinned, search_index.chunk_id, search_index.rank AS rank,
                    snippet(search_index, 2, '<b>', '</b>', '...', 32) AS snip
             FROM search_index
             JOIN items i ON i.id = search_index.file_id
             WHERE search_index MATCH ",
        );
        builder.push_bind(&sanitized);
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY rank LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::database_with_source("joined fts search failed", e))?;

        Ok(rows.iter().map(joined_hit_from_row).collect())
    }

    /// Name-weighted fuzzy search: prefix-matches the tokenized query
    /// against the file name column only.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn search_by_name_fuzzy(
        &self,
        query: &str,
        limit: i64,
        filters: &SearchFilters,
    ) -> Result<Vec<JoinedHit>> {
        let relaxed = sanitize_fts_query_relaxed(query);
        if relaxed.is_empty() {
            return Ok(Vec::new());
        }
        let match_expr = format!("file_name : ({relaxed})");

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT i.id AS item_id, i.path, i.name, i.kind, i.extension, i.size,
                    i.modified_at, i.is_pinned, search_index.chunk_id, search_index.rank AS rank,
                    snippet(search_index, 2, '<b>', '</b>', '...', 32) AS snip
             FROM search_index
             JOIN items i ON i.id = search_index.file_id
             WHERE search_index MATCH ",
        );
        builder.push_bind(&match_expr);
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY rank LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::database_with_source("name fuzzy search failed", e))?;

        Ok(rows.iter().map(joined_hit_from_row).collect())
    }

    /// Distinct corpus terms for the typo-rewrite dictionary: file name
    /// stems weighted by how often they appear.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn corpus_name_terms(&self, limit: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name, COUNT(*) AS n FROM items GROUP BY name ORDER BY n DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("corpus_name_terms failed", e))?;

        let mut terms = Vec::new();
        for row in &rows {
            let name: String = row.try_get("name").unwrap_or_default();
            for token in name.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
                if token.len() >= 3 && !terms.iter().any(|t| t == token) {
                    terms.push(token.to_owned());
                }
            }
        }
        Ok(terms)
    }
}
