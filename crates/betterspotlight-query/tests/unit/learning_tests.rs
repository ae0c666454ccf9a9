//! Learning layer: idempotency, privacy exclusion, rollout gating,
//! promotion persistence and scheduler accounting.

use std::sync::Arc;

use betterspotlight_domain::entities::{Chunk, LearningBackend, NewItem};
use betterspotlight_query::{QueryService, QueryServiceOptions};
use betterspotlight_store::SqliteStore;
use serde_json::{json, Value};

async fn learning_service() -> (tempfile::TempDir, SqliteStore, Arc<QueryService>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();

    for i in 0..10 {
        let path = format!("/docs/doc-{i}.md");
        let item = NewItem::from_path(&path, 256, 1_700_000_000.0, 1_700_000_100.0);
        let id = store.upsert_item(&item).await.unwrap();
        store
            .insert_chunks(
                id,
                &item.name,
                &path,
                &[Chunk::new(&path, 0, format!("rollout serving document {i}"))],
            )
            .await
            .unwrap();
    }

    store.set_setting("learningEnabled", "1").await.unwrap();
    store.set_setting("behaviorStreamEnabled", "1").await.unwrap();
    // Pause-on-input keeps idle cycles from racing the explicit triggers
    // below; manual triggers bypass the user-activity reason.
    store.set_setting("learningPauseOnUserInput", "1").await.unwrap();
    store.set_setting("onlineRankerMinExamples", "5").await.unwrap();
    store
        .set_setting("onlineRankerRolloutMode", "shadow_training")
        .await
        .unwrap();

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

fn behavior_event(event_id: &str, item_id: i64) -> Value {
    json!({
        "eventId": event_id,
        "eventType": "result_open",
        "source": "test",
        "timestamp": 1_700_000_000.0,
        "itemId": item_id,
        "itemPath": format!("/docs/doc-{item_id}.md"),
        "query": "rollout serving",
        "contextEventId": format!("ctx-{event_id}"),
        "attributionConfidence": 0.9,
    })
}

async fn seed_positive_events(service: &Arc<QueryService>, count: usize) {
    for i in 0..count {
        let response = service
            .dispatch(
                "record_behavior_event",
                behavior_event(&format!("seed-{i}"), (i % 10) as i64 + 1),
            )
            .await
            .unwrap();
        assert_eq!(response["recorded"], true);
    }
}

#[tokio::test]
async fn duplicate_event_ids_change_nothing_after_the_first() {
    let (_dir, _store, service) = learning_service().await;

    let first = service
        .dispatch("record_behavior_event", behavior_event("e1", 1))
        .await
        .unwrap();
    assert_eq!(first["recorded"], true);
    assert_eq!(first["attributedPositive"], true);
    let baseline = first["learningHealth"].clone();
    let events = baseline["events"].as_i64().unwrap();
    let positives = baseline["positiveExamples"].as_i64().unwrap();
    let pending = baseline["pendingExamples"].as_i64().unwrap();
    let scheduler = baseline["scheduler"]["reasonCounts"].clone();

    for _ in 0..10 {
        let replay = service
            .dispatch("record_behavior_event", behavior_event("e1", 1))
            .await
            .unwrap();
        assert_eq!(replay["recorded"], false);
        assert_eq!(replay["filteredOut"], false);
        assert_eq!(replay["attributedPositive"], false);
        let health = &replay["learningHealth"];
        assert_eq!(health["events"].as_i64().unwrap(), events);
        assert_eq!(health["positiveExamples"].as_i64().unwrap(), positives);
        assert_eq!(health["pendingExamples"].as_i64().unwrap(), pending);
        assert_eq!(health["scheduler"]["reasonCounts"], scheduler);
    }
}

#[tokio::test]
async fn privacy_flags_exclude_events_entirely() {
    let (_dir, _store, service) = learning_service().await;

    let before = service
        .dispatch("get_learning_health", json!({}))
        .await
        .unwrap()["learning"]
        .clone();

    for flag in ["secureInput", "privateContext", "denylistedApp", "redacted"] {
        let mut event = behavior_event(&format!("private-{flag}"), 1);
        event["privacyFlags"] = json!({flag: true});
        let response = service
            .dispatch("record_behavior_event", event)
            .await
            .unwrap();
        assert_eq!(response["recorded"], false);
        assert_eq!(response["filteredOut"], true);
        assert_eq!(response["attributedPositive"], false);
    }

    let after = service
        .dispatch("get_learning_health", json!({}))
        .await
        .unwrap()["learning"]
        .clone();
    assert_eq!(after["events"], before["events"]);
    assert_eq!(after["positiveExamples"], before["positiveExamples"]);
    assert_eq!(after["pendingExamples"], before["pendingExamples"]);
}

#[tokio::test]
async fn invalid_rollout_mode_is_rejected_without_state_change() {
    let (_dir, store, service) = learning_service().await;

    let err = service
        .dispatch(
            "set_learning_consent",
            json!({"onlineRankerRolloutMode": "full_send"}),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.ipc_code(),
        betterspotlight_domain::error::IpcErrorCode::InvalidParams
    );
    assert!(err.to_string().contains("invalid_rollout_mode"));
    assert_eq!(
        store
            .get_setting("onlineRankerRolloutMode")
            .await
            .unwrap()
            .as_deref(),
        Some("shadow_training"),
        "state unchanged after invalid value"
    );
}

#[tokio::test]
async fn promotion_persists_versions_and_backend() {
    let (_dir, store, service) = learning_service().await;
    seed_positive_events(&service, 6).await;

    let outcome = service
        .dispatch("trigger_learning_cycle", json!({}))
        .await
        .unwrap();
    assert_eq!(outcome["status"], "succeeded", "outcome: {outcome}");
    assert_eq!(outcome["reason"], "promoted");
    assert_eq!(outcome["modelVersion"], 1);

    let state = store.get_model_state("online_ranker").await.unwrap();
    assert_eq!(state.active_version, 1);
    assert_eq!(state.rollback_version, 0);
    assert_eq!(state.active_backend, LearningBackend::NativeSgd);
    assert_eq!(state.last_cycle_status, "succeeded");
    assert_eq!(state.last_cycle_reason, "promoted");

    // A second promotion keeps the previous version as rollback.
    for i in 0..6i64 {
        service
            .dispatch(
                "record_behavior_event",
                behavior_event(&format!("second-{i}"), i + 1),
            )
            .await
            .unwrap();
    }
    let outcome = service
        .dispatch("trigger_learning_cycle", json!({}))
        .await
        .unwrap();
    assert_eq!(outcome["status"], "succeeded");

    let state = store.get_model_state("online_ranker").await.unwrap();
    assert_eq!(state.active_version, 2);
    assert_eq!(state.rollback_version, 1);
}

#[tokio::test]
async fn rollout_gating_controls_serving_and_delta() {
    let (_dir, store, service) = learning_service().await;
    seed_positive_events(&service, 6).await;
    let outcome = service
        .dispatch("trigger_learning_cycle", json!({}))
        .await
        .unwrap();
    assert_eq!(outcome["status"], "succeeded");

    // Shadow training: model exists but serving is off.
    let response = service
        .dispatch("search", json!({"query": "rollout serving", "debug": true}))
        .await
        .unwrap();
    let debug = &response["debugInfo"];
    assert_eq!(debug["onlineRankerRolloutMode"], "shadow_training");
    assert_eq!(debug["onlineRankerServingAllowed"], false);
    assert_eq!(debug["onlineRankerApplied"], false);
    assert!(debug["onlineRankerDeltaTop10"].as_f64().unwrap().abs() < 1e-9);

    // Blended ranking: serving allowed, blend produces a visible delta.
    store
        .set_setting("onlineRankerRolloutMode", "blended_ranking")
        .await
        .unwrap();
    let response = service
        .dispatch("search", json!({"query": "rollout serving", "debug": true}))
        .await
        .unwrap();
    let debug = &response["debugInfo"];
    assert_eq!(debug["onlineRankerRolloutMode"], "blended_ranking");
    assert_eq!(debug["onlineRankerServingAllowed"], true);
    let delta = debug["onlineRankerDeltaTop10"].as_f64().unwrap();
    assert_eq!(debug["onlineRankerApplied"], delta.abs() > 1e-6);
    assert!(delta.abs() > 1e-6, "blend should move top-10 scores");

    // Instrumentation only: nothing serves, nothing trains.
    store
        .set_setting("onlineRankerRolloutMode", "instrumentation_only")
        .await
        .unwrap();
    let response = service
        .dispatch("search", json!({"query": "rollout serving", "debug": true}))
        .await
        .unwrap();
    assert_eq!(response["debugInfo"]["onlineRankerServingAllowed"], false);

    let rejected = service
        .dispatch("trigger_learning_cycle", json!({}))
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["reason"], "rollout_mode_blocks_training");
}

#[tokio::test]
async fn idle_cycle_reason_ladder_fires_in_order() {
    let (_dir, store, service) = learning_service().await;

    // Rollout blocks first.
    store
        .set_setting("onlineRankerRolloutMode", "instrumentation_only")
        .await
        .unwrap();
    let response = service
        .dispatch("record_behavior_event", behavior_event("ladder-1", 1))
        .await
        .unwrap();
    assert_eq!(response["idleCycleTriggered"], false);
    assert_eq!(response["idleCycleReason"], "rollout_mode_blocks_training");

    // Then user activity when pause-on-input is on.
    store
        .set_setting("onlineRankerRolloutMode", "shadow_training")
        .await
        .unwrap();
    store.set_setting("learningPauseOnUserInput", "1").await.unwrap();
    let response = service
        .dispatch("record_behavior_event", behavior_event("ladder-2", 1))
        .await
        .unwrap();
    assert_eq!(response["idleCycleReason"], "user_recently_active");

    // Then the example floor.
    store.set_setting("learningPauseOnUserInput", "0").await.unwrap();
    store.set_setting("onlineRankerMinExamples", "50").await.unwrap();
    let response = service
        .dispatch("record_behavior_event", behavior_event("ladder-3", 1))
        .await
        .unwrap();
    assert_eq!(response["idleCycleReason"], "not_enough_training_examples");

    // Then the learning flag.
    store.set_setting("onlineRankerMinExamples", "1").await.unwrap();
    store.set_setting("learningEnabled", "0").await.unwrap();
    let response = service
        .dispatch("record_behavior_event", behavior_event("ladder-4", 1))
        .await
        .unwrap();
    assert_eq!(response["idleCycleReason"], "learning_disabled");
}

#[tokio::test]
async fn scheduler_reason_counts_sum_to_ticks() {
    let (_dir, store, service) = learning_service().await;
    let engine = service.engine();

    for i in 0..7 {
        // Flip settings between ticks so several reasons accumulate.
        if i == 3 {
            store
                .set_setting("onlineRankerRolloutMode", "instrumentation_only")
                .await
                .unwrap();
        }
        engine.scheduler_tick().await.unwrap();
    }

    let health = service
        .dispatch("get_learning_health", json!({}))
        .await
        .unwrap()["learning"]
        .clone();
    let ticks = health["scheduler"]["ticks"].as_u64().unwrap();
    let counts = health["scheduler"]["reasonCounts"].as_object().unwrap();
    let sum: u64 = counts.values().map(|v| v.as_u64().unwrap()).sum();
    assert_eq!(ticks, 7);
    assert_eq!(sum, ticks, "sum(reasonCounts) == ticks");
    assert!(counts.len() >= 2, "settings flips produced distinct reasons");
}
