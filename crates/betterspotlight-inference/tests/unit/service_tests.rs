//! Inference service dispatch: envelopes, deadlines, cancellation, health.

use betterspotlight_domain::utils::time;
use betterspotlight_inference::InferenceService;
use serde_json::json;

#[tokio::test]
async fn embed_query_returns_status_and_model_role() {
    let service = InferenceService::new();
    let result = service
        .dispatch("embed_query", json!({"text": "quarterly report"}))
        .await
        .unwrap();

    assert_eq!(result["status"], "ok");
    assert_eq!(result["modelRole"], "embed_strong");
    let embedding = result["embedding"].as_array().unwrap();
    assert_eq!(embedding.len(), 384);
    service.shutdown();
}

#[tokio::test]
async fn embed_passages_routes_fast_and_rebuild_roles() {
    let service = InferenceService::new();

    let fast = service
        .dispatch("embed_query", json!({"text": "abc", "fast": true}))
        .await
        .unwrap();
    assert_eq!(fast["modelRole"], "embed_fast");

    let rebuild = service
        .dispatch(
            "embed_passages",
            json!({"texts": ["one", "two"], "rebuild": true}),
        )
        .await
        .unwrap();
    assert_eq!(rebuild["modelRole"], "rebuild_embed_strong");
    assert_eq!(rebuild["count"], 2);
    service.shutdown();
}

#[tokio::test]
async fn expired_deadline_short_circuits_with_fallback_reason() {
    let service = InferenceService::new();
    let result = service
        .dispatch(
            "embed_query",
            json!({"text": "abc", "deadlineMs": time::epoch_millis() - 1_000}),
        )
        .await
        .unwrap();

    assert_eq!(result["status"], "timeout");
    let reason = result["fallbackReason"].as_str().unwrap();
    assert!(!reason.is_empty(), "timeout must carry a fallbackReason");
    service.shutdown();
}

#[tokio::test]
async fn cancel_token_blocks_subsequent_requests() {
    let service = InferenceService::new();
    let cancel = service
        .dispatch("cancel_request", json!({"cancelToken": "tok-1"}))
        .await
        .unwrap();
    assert_eq!(cancel["cancelled"], true);

    let result = service
        .dispatch(
            "rerank_fast",
            json!({"query": "q", "passages": ["a"], "cancelToken": "tok-1"}),
        )
        .await
        .unwrap();
    assert_eq!(result["status"], "cancelled");
    service.shutdown();
}

#[tokio::test]
async fn rerank_scores_align_with_passages() {
    let service = InferenceService::new();
    let result = service
        .dispatch(
            "rerank_strong",
            json!({
                "query": "quarterly revenue",
                "passages": [
                    "quarterly revenue grew sharply",
                    "completely unrelated text",
                ],
            }),
        )
        .await
        .unwrap();

    assert_eq!(result["status"], "ok");
    assert_eq!(result["modelRole"], "rerank_strong");
    let scores = result["scores"].as_array().unwrap();
    assert_eq!(scores.len(), 2);
    assert!(scores[0].as_f64().unwrap() > scores[1].as_f64().unwrap());
    service.shutdown();
}

#[tokio::test]
async fn qa_extract_returns_span_or_null() {
    let service = InferenceService::new();
    let hit = service
        .dispatch(
            "qa_extract",
            json!({
                "query": "what is the revenue target",
                "passages": ["The revenue target is two million dollars. Other sentence."],
            }),
        )
        .await
        .unwrap();
    assert_eq!(hit["status"], "ok");
    assert!(hit["answer"].as_str().unwrap().contains("two million"));

    let miss = service
        .dispatch(
            "qa_extract",
            json!({"query": "zebra xylophone", "passages": ["nothing relevant here"]}),
        )
        .await
        .unwrap();
    assert!(miss["answer"].is_null());
    service.shutdown();
}

#[tokio::test]
async fn health_reports_every_started_role() {
    let service = InferenceService::new();
    // Touch one role so counters move.
    let _ = service
        .dispatch("embed_query", json!({"text": "warm up"}))
        .await
        .unwrap();

    let health = service.dispatch("get_inference_health", json!({})).await.unwrap();
    assert_eq!(health["status"], "ok");
    let statuses = health["roleStatusByModel"].as_object().unwrap();
    for role in [
        "embed_strong",
        "embed_fast",
        "rerank_strong",
        "rerank_fast",
        "qa_extractive",
        "rebuild_embed_strong",
        "rebuild_embed_fast",
    ] {
        assert_eq!(statuses[role], "ready", "role {role}");
    }
    assert!(health["queueDepthByRole"].is_object());
    assert!(health["restartBudgetExhaustedByRole"].is_object());
    service.shutdown();
}

#[tokio::test]
async fn missing_params_fail_with_reason_and_unknown_method_is_not_found() {
    let service = InferenceService::new();

    let failed = service.dispatch("embed_query", json!({})).await.unwrap();
    assert_eq!(failed["status"], "failed");
    assert!(failed["fallbackReason"].as_str().unwrap().contains("required"));

    let err = service.dispatch("no_such_method", json!({})).await.unwrap_err();
    assert_eq!(
        err.ipc_code(),
        betterspotlight_domain::error::IpcErrorCode::NotFound
    );
    service.shutdown();
}
