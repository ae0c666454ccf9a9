//! Search pipeline end to end against a seeded temp store.

use std::sync::Arc;

use betterspotlight_domain::entities::{Chunk, NewItem};
use betterspotlight_query::{QueryService, QueryServiceOptions};
use betterspotlight_store::SqliteStore;
use serde_json::json;

async fn seeded_service() -> (tempfile::TempDir, SqliteStore, Arc<QueryService>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();

    let docs: &[(&str, &str)] = &[
        ("/docs/rollout-plan.md", "rollout serving plan for the search engine"),
        ("/docs/serving-notes.md", "notes about serving infrastructure rollout"),
        ("/docs/unrelated.md", "grocery list apples bananas"),
        ("/code/search.rs", "fn serve_rollout() { /* serving rollout */ }"),
    ];
    for (path, text) in docs {
        let item = NewItem::from_path(path, 512, 1_700_000_000.0, 1_700_000_100.0);
        let id = store.upsert_item(&item).await.unwrap();
        store
            .insert_chunks(id, &item.name, path, &[Chunk::new(path, 0, (*text).to_owned())])
            .await
            .unwrap();
    }

    let service = QueryService::start(
        store.clone(),
        QueryServiceOptions {
            data_dir: dir.path().join("data"),
            inference: None,
            indexer: None,
        },
    )
    .await
    .unwrap();
    (dir, store, service)
}

#[tokio::test]
async fn search_returns_ranked_results_with_metadata() {
    let (_dir, _store, service) = seeded_service().await;
    let response = service
        .dispatch("search", json!({"query": "rollout serving", "limit": 10}))
        .await
        .unwrap();

    let results = response["results"].as_array().unwrap();
    assert!(results.len() >= 2);
    assert!(results.iter().all(|r| r["itemId"].as_i64().unwrap() > 0));
    assert!(results.iter().all(|r| r["contentAvailable"] == true));
    // Best-first ordering.
    let scores: Vec<f64> = results.iter().map(|r| r["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn type_hint_is_parsed_and_filters_results() {
    let (_dir, _store, service) = seeded_service().await;
    let response = service
        .dispatch(
            "search",
            json!({"query": "rollout serving md", "debug": true}),
        )
        .await
        .unwrap();

    let debug = &response["debugInfo"];
    assert_eq!(debug["plannerApplied"], true);
    assert_eq!(debug["queryAfterParse"], "rollout serving");
    assert_eq!(debug["parsedTypes"][0], "md");

    let results = response["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r["path"].as_str().unwrap().ends_with(".md")));
}

#[tokio::test]
async fn strict_mode_reports_strict_reason_and_never_rewrites() {
    let (_dir, _store, service) = seeded_service().await;
    let response = service
        .dispatch(
            "search",
            json!({"query": "rollout", "queryMode": "strict", "debug": true}),
        )
        .await
        .unwrap();
    let debug = &response["debugInfo"];
    assert_eq!(debug["rewriteApplied"], false);
    assert_eq!(debug["rewriteReason"], "strict_mode");
}

#[tokio::test]
async fn merge_weights_always_sum_to_one_and_adapt() {
    let (_dir, _store, service) = seeded_service().await;

    let short = service
        .dispatch("search", json!({"query": "rollout", "debug": true}))
        .await
        .unwrap();
    let dbg = &short["debugInfo"];
    let sum = dbg["lexicalWeight"].as_f64().unwrap() + dbg["semanticWeight"].as_f64().unwrap();
    assert!((sum - 1.0).abs() < 1e-9);
    assert_eq!(dbg["lexicalWeight"], 0.55);

    let natural = service
        .dispatch(
            "search",
            json!({"query": "rollout serving plan engine", "debug": true}),
        )
        .await
        .unwrap();
    let dbg = &natural["debugInfo"];
    let sum = dbg["lexicalWeight"].as_f64().unwrap() + dbg["semanticWeight"].as_f64().unwrap();
    assert!((sum - 1.0).abs() < 1e-9);
    assert_eq!(dbg["lexicalWeight"], 0.45);
    assert_eq!(dbg["adaptiveMergeApplied"], true);
}

#[tokio::test]
async fn unknown_query_mode_is_invalid_params() {
    let (_dir, _store, service) = seeded_service().await;
    let err = service
        .dispatch("search", json!({"query": "x", "queryMode": "yolo"}))
        .await
        .unwrap_err();
    assert_eq!(
        err.ipc_code(),
        betterspotlight_domain::error::IpcErrorCode::InvalidParams
    );
}

#[tokio::test]
async fn clipboard_hints_are_counted_but_never_stored() {
    let (_dir, store, service) = seeded_service().await;
    let response = service
        .dispatch(
            "search",
            json!({
                "query": "rollout serving",
                "debug": true,
                "clipboardBasename": "rollout-plan.md",
                "clipboardDirname": "/docs",
            }),
        )
        .await
        .unwrap();
    let debug = &response["debugInfo"];
    assert_eq!(debug["clipboardSignalsProvided"], 2);
    assert!(debug["clipboardSignalBoostedResults"].as_u64().unwrap() >= 1);

    // The raw clipboard content must not land in the settings or feedback.
    assert!(store.get_setting("clipboard").await.unwrap().is_none());
}

#[tokio::test]
async fn feedback_and_frequency_round_trip() {
    let (_dir, store, service) = seeded_service().await;
    let item = store
        .get_item_by_path("/docs/rollout-plan.md")
        .await
        .unwrap()
        .unwrap();

    let recorded = service
        .dispatch(
            "recordFeedback",
            json!({"itemId": item.id, "action": "opened", "query": "rollout", "resultPosition": 0}),
        )
        .await
        .unwrap();
    assert_eq!(recorded["recorded"], true);

    let freq = service
        .dispatch("getFrequency", json!({"itemId": item.id}))
        .await
        .unwrap();
    assert_eq!(freq["openCount"], 1);
    assert_eq!(freq["totalInteractions"], 1);
}

#[tokio::test]
async fn health_reports_counts_queue_source_and_memory() {
    let (_dir, _store, service) = seeded_service().await;
    let health = service.dispatch("getHealth", json!({})).await.unwrap();

    assert_eq!(health["queueSource"], "unavailable");
    assert_eq!(health["criticalFailures"], 0);
    assert_eq!(health["expectedGapFailures"], 0);
    assert_eq!(health["healthStatusReason"], "ok");
    assert_eq!(health["totalIndexedItems"], 4);
    assert_eq!(health["inferenceServiceConnected"], false);
    assert!(health["processStats"]["query"]["available"].as_bool().unwrap());
    assert!(health["retrievalAdvisory"].is_null());
}

#[tokio::test]
async fn health_details_paginate_failures_with_severity() {
    let (_dir, store, service) = seeded_service().await;
    let item = store.get_item_by_path("/docs/unrelated.md").await.unwrap().unwrap();
    store
        .record_failure(item.id, "extraction", "PDF extraction unavailable (no backend)")
        .await
        .unwrap();
    store
        .record_failure(item.id, "write", "disk I/O error")
        .await
        .unwrap();

    let details = service
        .dispatch("getHealthDetails", json!({"limit": 10, "offset": 0}))
        .await
        .unwrap();
    let failures = details["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 2);
    let severities: Vec<&str> = failures
        .iter()
        .map(|f| f["severity"].as_str().unwrap())
        .collect();
    assert!(severities.contains(&"critical"));
    assert!(severities.contains(&"expected_gap"));
    assert!(details["bsignore"].is_object());
    assert!(details["queryStats"].is_object());
}

#[tokio::test]
async fn rebuild_vector_index_swaps_generations() {
    let (_dir, store, service) = seeded_service().await;
    let first = service
        .dispatch("rebuild_vector_index", json!({}))
        .await
        .unwrap();
    assert_eq!(first["status"], "ok");
    assert_eq!(first["targetGeneration"], 1);

    let second = service
        .dispatch("rebuild_vector_index", json!({}))
        .await
        .unwrap();
    assert_eq!(second["targetGeneration"], 2);

    let state = store.get_generation_state().await.unwrap();
    assert_eq!(state.active_version, 2);
    assert_eq!(state.rollback_version, 1);
}

#[tokio::test]
async fn semantic_path_joins_results_after_rebuild() {
    let (_dir, store, service) = seeded_service().await;
    store.set_setting("embeddingEnabled", "1").await.unwrap();
    service.dispatch("rebuild_vector_index", json!({})).await.unwrap();

    let response = service
        .dispatch(
            "search",
            json!({"query": "rollout serving plan engine", "debug": true}),
        )
        .await
        .unwrap();
    let debug = &response["debugInfo"];
    assert!(debug["semanticCandidates"].as_u64().unwrap() > 0);
    assert!(debug["indexHealth"]["semanticSkipReason"].is_null());
}
