//! Answer snippet extraction policy.

use std::sync::Arc;

use betterspotlight_domain::constants::search::ANSWER_SNIPPET_MAX_CHARS;
use betterspotlight_domain::ports::QaBackend;
use betterspotlight_domain::Result;
use betterspotlight_store::SqliteStore;
use serde_json::{json, Value};

use crate::planner;

/// Resolve the snippet target by path or item id, then run the policy
/// ladder: feature gate, query length, item presence, content presence,
/// extractive floor.
pub async fn answer_snippet(
    store: &SqliteStore,
    qa: &Arc<dyn QaBackend>,
    enabled: bool,
    query: &str,
    path: Option<&str>,
    item_id: Option<i64>,
    max_chars: Option<usize>,
) -> Result<Value> {
    if !enabled {
        return Ok(unavailable("feature_disabled"));
    }
    if planner::meaningful_token_count(query) < 2 {
        return Ok(unavailable("query_too_short"));
    }

    let item = match (path, item_id) {
        (Some(p), _) => store.get_item_by_path(p).await?,
        (None, Some(id)) => store.get_item_by_id(id).await?,
        (None, None) => None,
    };
    let Some(item) = item else {
        return Ok(unavailable("item_not_found"));
    };

    let chunks = store.chunks_for_item(item.id).await?;
    let passages: Vec<String> = chunks
        .into_iter()
        .map(|c| c.text)
        .filter(|t| !t.trim().is_empty())
        .collect();
    if passages.is_empty() {
        return Ok(unavailable("no_content"));
    }

    let Some(span) = qa.extract(query, &passages).await? else {
        return Ok(unavailable("no_answer"));
    };

    let max_chars = max_chars.unwrap_or(ANSWER_SNIPPET_MAX_CHARS);
    Ok(json!({
        "available": true,
        "reason": "ok",
        "answer": clip(&span.text, max_chars),
        "confidence": span.confidence.clamp(f64::MIN_POSITIVE, 1.0),
        "source": item.path,
    }))
}

fn unavailable(reason: &str) -> Value {
    json!({"available": false, "reason": reason})
}

/// Clip to `max_chars` characters with an ellipsis.
#[must_use]
pub fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}\u{2026}", clipped.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_respects_char_budget_and_ellipsizes() {
        assert_eq!(clip("short", 240), "short");
        let long = "x".repeat(400);
        let clipped = clip(&long, 240);
        assert_eq!(clipped.chars().count(), 240);
        assert!(clipped.ends_with('\u{2026}'));
    }
}
