//! Extractor service: IPC surface over the native extractor.

use std::sync::Arc;

use betterspotlight_domain::ports::{ContentExtractor, ExtractionOutcome};
use betterspotlight_domain::{Error, Result};
use betterspotlight_ipc::service::MethodHandler;
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::extractor::NativeExtractor;

/// Default per-file extraction timeout.
const EXTRACTION_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// Build the extractor service's method handler.
#[must_use]
pub fn method_handler() -> MethodHandler {
    let extractor: Arc<dyn ContentExtractor> = Arc::new(NativeExtractor::new());
    Arc::new(move |method: String, params: Value| {
        let extractor = Arc::clone(&extractor);
        Box::pin(async move { dispatch(&extractor, &method, params).await })
    })
}

async fn dispatch(
    extractor: &Arc<dyn ContentExtractor>,
    method: &str,
    params: Value,
) -> Result<Value> {
    match method {
        "extract" => handle_extract(extractor, &params).await,
        other => Err(Error::not_found(format!("method '{other}'"))),
    }
}

async fn handle_extract(extractor: &Arc<dyn ContentExtractor>, params: &Value) -> Result<Value> {
    let path = params
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_params("'path' is required"))?;
    let max_bytes = params.get("maxBytes").and_then(Value::as_i64).unwrap_or(0);
    let timeout_ms = params
        .get("timeoutMs")
        .and_then(Value::as_u64)
        .unwrap_or(EXTRACTION_TIMEOUT_MS_DEFAULT);

    let outcome = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        extractor.extract(std::path::Path::new(path), max_bytes),
    )
    .await
    .map_err(|_| Error::timeout(format!("extraction of {path}")))??;

    Ok(match outcome {
        ExtractionOutcome::Text(text) => json!({
            "status": "ok",
            "text": text,
        }),
        ExtractionOutcome::ExpectedGap(message) => json!({
            "status": "expected_gap",
            "message": message,
        }),
    })
}
