//! Answer snippet policy ladder.

use std::sync::Arc;

use betterspotlight_domain::entities::{Chunk, NewItem};
use betterspotlight_query::{QueryService, QueryServiceOptions};
use betterspotlight_store::SqliteStore;
use serde_json::json;

async fn snippet_service() -> (tempfile::TempDir, SqliteStore, Arc<QueryService>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();

    let path = "/docs/targets.md";
    let item = NewItem::from_path(path, 256, 1_700_000_000.0, 1_700_000_100.0);
    let id = store.upsert_item(&item).await.unwrap();
    store
        .insert_chunks(
            id,
            &item.name,
            path,
            &[Chunk::new(
                path,
                0,
                "Preamble text. The quarterly revenue target is two million dollars. Outro."
                    .to_owned(),
            )],
        )
        .await
        .unwrap();

    // An item row with no content at all.
    let empty = NewItem::from_path("/docs/empty.pdf", 64, 1_700_000_000.0, 1_700_000_100.0);
    store.upsert_item(&empty).await.unwrap();

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
async fn ok_snippet_carries_answer_confidence_and_source() {
    let (_dir, _store, service) = snippet_service().await;
    let response = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "quarterly revenue target", "path": "/docs/targets.md"}),
        )
        .await
        .unwrap();

    assert_eq!(response["available"], true);
    assert_eq!(response["reason"], "ok");
    assert!(response["answer"].as_str().unwrap().contains("two million"));
    let confidence = response["confidence"].as_f64().unwrap();
    assert!(confidence > 0.0 && confidence <= 1.0);
    assert_eq!(response["source"], "/docs/targets.md");
}

#[tokio::test]
async fn feature_disabled_reason() {
    let (_dir, store, service) = snippet_service().await;
    store.set_setting("qaSnippetEnabled", "0").await.unwrap();
    let response = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "quarterly revenue target", "path": "/docs/targets.md"}),
        )
        .await
        .unwrap();
    assert_eq!(response["available"], false);
    assert_eq!(response["reason"], "feature_disabled");
}

#[tokio::test]
async fn query_too_short_reason() {
    let (_dir, _store, service) = snippet_service().await;
    let response = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "the of", "path": "/docs/targets.md"}),
        )
        .await
        .unwrap();
    assert_eq!(response["reason"], "query_too_short");
}

#[tokio::test]
async fn item_not_found_and_no_content_reasons() {
    let (_dir, _store, service) = snippet_service().await;

    let missing = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "quarterly revenue target", "path": "/nope.md"}),
        )
        .await
        .unwrap();
    assert_eq!(missing["reason"], "item_not_found");

    let empty = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "quarterly revenue target", "path": "/docs/empty.pdf"}),
        )
        .await
        .unwrap();
    assert_eq!(empty["reason"], "no_content");
}

#[tokio::test]
async fn no_answer_below_the_score_floor() {
    let (_dir, _store, service) = snippet_service().await;
    let response = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "zebra xylophone harmonica", "path": "/docs/targets.md"}),
        )
        .await
        .unwrap();
    assert_eq!(response["available"], false);
    assert_eq!(response["reason"], "no_answer");
}

#[tokio::test]
async fn answers_are_clipped_to_max_chars() {
    let (_dir, store, service) = snippet_service().await;
    let path = "/docs/long.md";
    let item = NewItem::from_path(path, 4_096, 1_700_000_000.0, 1_700_000_100.0);
    let id = store.upsert_item(&item).await.unwrap();
    let long_sentence = format!(
        "The quarterly revenue target explanation goes on {} and on",
        "and on ".repeat(80)
    );
    store
        .insert_chunks(id, &item.name, path, &[Chunk::new(path, 0, long_sentence)])
        .await
        .unwrap();

    let response = service
        .dispatch(
            "getAnswerSnippet",
            json!({"query": "quarterly revenue target", "path": path, "maxChars": 120}),
        )
        .await
        .unwrap();
    assert_eq!(response["reason"], "ok");
    let answer = response["answer"].as_str().unwrap();
    assert!(answer.chars().count() <= 120);
    assert!(answer.ends_with('\u{2026}'));
}
