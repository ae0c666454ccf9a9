//! Learning persistence: event idempotency, training batches, model state.

use betterspotlight_domain::entities::{
    BehaviorEvent, BehaviorEventType, LearningBackend, LearningModelState, PrivacyFlags,
    TrainingExample,
};
use betterspotlight_store::SqliteStore;
use serde_json::json;

async fn open_temp_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("index.db")).await.unwrap();
    (dir, store)
}

fn event(id: &str) -> BehaviorEvent {
    BehaviorEvent {
        event_id: id.to_owned(),
        event_type: BehaviorEventType::ResultOpen,
        source: "test".to_owned(),
        timestamp: 1_700_000_000.0,
        item_id: Some(1),
        item_path: Some("/doc/a.txt".to_owned()),
        query: "alpha".to_owned(),
        app_bundle_id: None,
        context_event_id: Some("ctx-1".to_owned()),
        activity_digest: None,
        attribution_confidence: 0.9,
        privacy_flags: PrivacyFlags::default(),
    }
}

#[tokio::test]
async fn duplicate_event_ids_insert_once() {
    let (_dir, store) = open_temp_store().await;
    assert!(store.insert_behavior_event(&event("e1"), true).await.unwrap());
    for _ in 0..10 {
        assert!(!store.insert_behavior_event(&event("e1"), true).await.unwrap());
    }
    assert_eq!(store.count_behavior_events().await.unwrap(), 1);

    let (events, positives, with_context) = store.behavior_coverage().await.unwrap();
    assert_eq!(events, 1);
    assert_eq!(positives, 1);
    assert_eq!(with_context, 1);
}

#[tokio::test]
async fn training_batch_lifecycle() {
    let (_dir, store) = open_temp_store().await;
    for i in 0..5 {
        store
            .insert_training_example(&TrainingExample {
                sample_id: format!("s{i}"),
                query: "alpha".to_owned(),
                item_id: i,
                features: json!({"bm25": 1.0, "position": i}),
                label: 1,
                weight: 1.0,
                attribution_confidence: 0.8,
                consumed: false,
                created_at: 1_700_000_000.0 + f64::from(i as i32),
            })
            .await
            .unwrap();
    }
    assert_eq!(store.pending_example_count().await.unwrap(), 5);

    let batch = store.fetch_training_batch(3).await.unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].sample_id, "s0", "oldest first");

    let ids: Vec<String> = batch.iter().map(|e| e.sample_id.clone()).collect();
    store.mark_examples_consumed(&ids).await.unwrap();
    assert_eq!(store.pending_example_count().await.unwrap(), 2);
}

#[tokio::test]
async fn model_state_round_trips_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("index.db");

    {
        let store = SqliteStore::open(&db).await.unwrap();
        let fresh = store.get_model_state("online_ranker").await.unwrap();
        assert_eq!(fresh.active_version, 0);
        assert_eq!(fresh.active_backend, LearningBackend::None);

        store
            .put_model_state(&LearningModelState {
                name: "online_ranker".to_owned(),
                active_version: 7,
                rollback_version: 6,
                active_backend: LearningBackend::NativeSgd,
                last_cycle_status: "succeeded".to_owned(),
                last_cycle_reason: "promoted".to_owned(),
                cycles_run: 3,
                promotions: 2,
                rejections: 1,
            })
            .await
            .unwrap();
        store.close().await;
    }

    let store = SqliteStore::open(&db).await.unwrap();
    let state = store.get_model_state("online_ranker").await.unwrap();
    assert_eq!(state.active_version, 7);
    assert_eq!(state.rollback_version, 6);
    assert_eq!(state.active_backend, LearningBackend::NativeSgd);
    assert_eq!(state.last_cycle_status, "succeeded");
    assert_eq!(state.last_cycle_reason, "promoted");
}

#[tokio::test]
async fn reservoir_offers_and_samples() {
    let (_dir, store) = open_temp_store().await;
    for i in 0..10 {
        store
            .reservoir_offer("alpha", i, &json!({"position": i}))
            .await
            .unwrap();
    }
    let sample = store.reservoir_sample(4).await.unwrap();
    assert_eq!(sample.len(), 4);
    assert!(sample.iter().all(|(q, _, _)| q == "alpha"));
}

#[tokio::test]
async fn generation_swap_keeps_rollback() {
    let (_dir, store) = open_temp_store().await;
    assert_eq!(store.get_generation_state().await.unwrap().active_version, 0);

    let state = store.swap_generation(1).await.unwrap();
    assert_eq!(state.active_version, 1);
    assert_eq!(state.rollback_version, 0);

    let state = store.swap_generation(2).await.unwrap();
    assert_eq!(state.active_version, 2);
    assert_eq!(state.rollback_version, 1);

    let persisted = store.get_generation_state().await.unwrap();
    assert_eq!(persisted.active_version, 2);
    assert_eq!(persisted.rollback_version, 1);
}
