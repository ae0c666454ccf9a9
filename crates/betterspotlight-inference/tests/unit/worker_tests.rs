//! Worker admission control with a deliberately slow executor.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use betterspotlight_domain::value_objects::{AdmissionVerdict, RequestEnvelope, Role};
use betterspotlight_inference::worker::{
    TaskExecutor, Worker, WorkerTask, WORKER_QUEUE_LIMIT_LIVE,
};
use betterspotlight_inference::InferenceSupervisorActor;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::oneshot;

fn slow_executor() -> TaskExecutor {
    Arc::new(|_method: &str, _params: &serde_json::Value| {
        std::thread::sleep(Duration::from_millis(50));
        Ok(json!({}))
    })
}

fn task(reply: oneshot::Sender<serde_json::Value>) -> WorkerTask {
    WorkerTask {
        method: "embed_query".to_owned(),
        envelope: RequestEnvelope::default(),
        params: json!({"text": "x"}),
        reply,
    }
}

#[tokio::test]
async fn live_lane_rejects_past_the_worker_cap() {
    let actor = Arc::new(InferenceSupervisorActor::new());
    let cancelled = Arc::new(DashMap::new());
    let global_live = Arc::new(AtomicUsize::new(0));
    let global_rebuild = Arc::new(AtomicUsize::new(0));
    let worker = Worker::spawn(
        Role::EmbedStrong,
        "test-model",
        slow_executor(),
        actor,
        cancelled,
        global_live,
        global_rebuild,
    );

    let mut receivers = Vec::new();
    let mut rejections = Vec::new();
    for _ in 0..(WORKER_QUEUE_LIMIT_LIVE + 16) {
        let (tx, rx) = oneshot::channel();
        match worker.submit(task(tx)) {
            AdmissionVerdict::Accepted => receivers.push(rx),
            AdmissionVerdict::Rejected(reason) => rejections.push(reason),
        }
    }

    assert!(
        !rejections.is_empty(),
        "submitting past the cap must reject some requests"
    );
    assert!(rejections.iter().all(|r| r == "worker_queue_full"));
    assert!(receivers.len() >= WORKER_QUEUE_LIMIT_LIVE);

    worker.stop();
}

#[tokio::test]
async fn accepted_tasks_eventually_complete_in_fifo_order() {
    let actor = Arc::new(InferenceSupervisorActor::new());
    let worker = Worker::spawn(
        Role::EmbedFast,
        "test-model",
        Arc::new(|_m: &str, params: &serde_json::Value| Ok(params.clone())),
        actor,
        Arc::new(DashMap::new()),
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
    );

    let mut receivers = Vec::new();
    for i in 0..8 {
        let (tx, rx) = oneshot::channel();
        let mut t = task(tx);
        t.params = json!({"n": i});
        assert_eq!(worker.submit(t), AdmissionVerdict::Accepted);
        receivers.push((i, rx));
    }

    for (i, rx) in receivers {
        let response = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response["status"], "ok");
        assert_eq!(response["n"], i);
        assert_eq!(response["modelRole"], "embed_fast");
    }
    worker.stop();
}
