//! Per-role worker: one OS thread, a Live queue and a Rebuild queue, FIFO
//! within each lane, admission caps enforced at submit time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use betterspotlight_domain::utils::time;
use betterspotlight_domain::value_objects::{AdmissionVerdict, RequestEnvelope, Role};
use betterspotlight_domain::Result;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::supervisor_actor::InferenceSupervisorActor;

/// Per-worker Live queue cap.
pub const WORKER_QUEUE_LIMIT_LIVE: usize = 64;

/// Per-worker Rebuild queue cap.
pub const WORKER_QUEUE_LIMIT_REBUILD: usize = 512;

/// Global Live depth cap across all workers.
pub const GLOBAL_QUEUE_LIMIT_LIVE: usize = 256;

/// Global Rebuild depth cap across all workers.
pub const GLOBAL_QUEUE_LIMIT_REBUILD: usize = 2_048;

/// Synchronous compute hook: `(method, params) -> method-specific result`.
pub type TaskExecutor = Arc<dyn Fn(&str, &Value) -> Result<Value> + Send + Sync>;

/// One queued request.
pub struct WorkerTask {
    pub method: String,
    pub envelope: RequestEnvelope,
    pub params: Value,
    pub reply: oneshot::Sender<Value>,
}

#[derive(Default)]
struct Queues {
    live: VecDeque<WorkerTask>,
    rebuild: VecDeque<WorkerTask>,
    stop: bool,
}

/// Worker counters surfaced in health.
#[derive(Default)]
pub struct WorkerCounters {
    pub submitted: AtomicI64,
    pub completed: AtomicI64,
    pub timed_out: AtomicI64,
    pub cancelled: AtomicI64,
    pub failed: AtomicI64,
}

/// A per-role worker lane pair.
pub struct Worker {
    pub role: Role,
    model_id: String,
    queues: Mutex<Queues>,
    cv: Condvar,
    pub counters: WorkerCounters,
    global_live: Arc<AtomicUsize>,
    global_rebuild: Arc<AtomicUsize>,
}

/// Build the standard result payload every inference response carries.
#[must_use]
pub fn status_payload(
    status: &str,
    role: Role,
    model_id: &str,
    elapsed_ms: i64,
    extra: Value,
    fallback_reason: Option<&str>,
) -> Value {
    let mut payload = json!({
        "status": status,
        "modelRole": role.as_str(),
        "modelId": model_id,
        "elapsedMs": elapsed_ms,
    });
    if let (Some(obj), Value::Object(extra_map)) = (payload.as_object_mut(), extra) {
        for (k, v) in extra_map {
            obj.insert(k, v);
        }
    }
    if let Some(reason) = fallback_reason {
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("fallbackReason".to_owned(), Value::from(reason));
        }
    }
    payload
}

impl Worker {
    /// Spawn the worker thread for `role`.
    pub fn spawn(
        role: Role,
        model_id: &str,
        executor: TaskExecutor,
        actor: Arc<InferenceSupervisorActor>,
        cancelled: Arc<DashMap<String, i64>>,
        global_live: Arc<AtomicUsize>,
        global_rebuild: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        let worker = Arc::new(Self {
            role,
            model_id: model_id.to_owned(),
            queues: Mutex::new(Queues::default()),
            cv: Condvar::new(),
            counters: WorkerCounters::default(),
            global_live,
            global_rebuild,
        });
        actor.record_success(role.as_str());

        let loop_worker = Arc::clone(&worker);
        std::thread::Builder::new()
            .name(format!("bs-inference-{}", role.as_str()))
            .spawn(move || loop_worker.run(&executor, &actor, &cancelled))
            .ok();
        worker
    }

    /// Admission control, then enqueue. Live roles land in the Live lane,
    /// rebuild roles in the Rebuild lane.
    pub fn submit(&self, task: WorkerTask) -> AdmissionVerdict {
        let rebuild = self.role.is_rebuild();
        let Ok(mut queues) = self.queues.lock() else {
            return AdmissionVerdict::Rejected("worker_queue_full".to_owned());
        };
        if queues.stop {
            return AdmissionVerdict::Rejected("worker_queue_full".to_owned());
        }

        if rebuild {
            if queues.rebuild.len() >= WORKER_QUEUE_LIMIT_REBUILD {
                return AdmissionVerdict::Rejected("worker_queue_full".to_owned());
            }
            if self.global_rebuild.load(Ordering::SeqCst) >= GLOBAL_QUEUE_LIMIT_REBUILD {
                return AdmissionVerdict::Rejected("global_rebuild_queue_full".to_owned());
            }
            self.global_rebuild.fetch_add(1, Ordering::SeqCst);
            queues.rebuild.push_back(task);
        } else {
            if queues.live.len() >= WORKER_QUEUE_LIMIT_LIVE {
                return AdmissionVerdict::Rejected("worker_queue_full".to_owned());
            }
            if self.global_live.load(Ordering::SeqCst) >= GLOBAL_QUEUE_LIMIT_LIVE {
                return AdmissionVerdict::Rejected("global_live_queue_full".to_owned());
            }
            self.global_live.fetch_add(1, Ordering::SeqCst);
            queues.live.push_back(task);
        }
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        drop(queues);
        self.cv.notify_one();
        AdmissionVerdict::Accepted
    }

    /// Current combined queue depth.
    pub fn queue_depth(&self) -> usize {
        self.queues
            .lock()
            .map_or(0, |q| q.live.len() + q.rebuild.len())
    }

    /// Stop the worker thread.
    pub fn stop(&self) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.stop = true;
        }
        self.cv.notify_all();
    }

    fn run(
        &self,
        executor: &TaskExecutor,
        actor: &Arc<InferenceSupervisorActor>,
        cancelled: &Arc<DashMap<String, i64>>,
    ) {
        info!(role = self.role.as_str(), "worker started");
        loop {
            let task = {
                let Ok(mut queues) = self.queues.lock() else { break };
                loop {
                    if queues.stop {
                        return;
                    }
                    if let Some(task) = queues.live.pop_front() {
                        self.global_live.fetch_sub(1, Ordering::SeqCst);
                        break Some(task);
                    }
                    if let Some(task) = queues.rebuild.pop_front() {
                        self.global_rebuild.fetch_sub(1, Ordering::SeqCst);
                        break Some(task);
                    }
                    queues = match self.cv.wait(queues) {
                        Ok(q) => q,
                        Err(_) => return,
                    };
                }
            };
            let Some(task) = task else { break };
            self.execute(task, executor, actor, cancelled);
        }
    }

    fn execute(
        &self,
        task: WorkerTask,
        executor: &TaskExecutor,
        actor: &Arc<InferenceSupervisorActor>,
        cancelled: &Arc<DashMap<String, i64>>,
    ) {
        let started = Instant::now();
        let now_ms = time::epoch_millis();
        let role = self.role;

        let is_cancelled = task
            .envelope
            .cancel_token
            .as_ref()
            .is_some_and(|t| cancelled.contains_key(t));
        let response = if is_cancelled {
            self.counters.cancelled.fetch_add(1, Ordering::SeqCst);
            status_payload(
                "cancelled",
                role,
                &self.model_id,
                0,
                json!({}),
                Some("request cancel token was invalidated"),
            )
        } else if task.envelope.expired(now_ms) {
            self.counters.timed_out.fetch_add(1, Ordering::SeqCst);
            actor.record_timeout(role.as_str());
            status_payload(
                "timeout",
                role,
                &self.model_id,
                0,
                json!({}),
                Some("deadline expired before execution"),
            )
        } else {
            match executor(&task.method, &task.params) {
                Ok(extra) => {
                    self.counters.completed.fetch_add(1, Ordering::SeqCst);
                    actor.record_success(role.as_str());
                    status_payload(
                        "ok",
                        role,
                        &self.model_id,
                        started.elapsed().as_millis() as i64,
                        extra,
                        None,
                    )
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    let decision = actor.record_failure(role.as_str());
                    warn!(role = role.as_str(), error = %e, "inference task failed");
                    if decision.restart_requested {
                        std::thread::sleep(std::time::Duration::from_millis(decision.backoff_ms));
                        actor.reset_role(role.as_str());
                    }
                    status_payload(
                        "failed",
                        role,
                        &self.model_id,
                        started.elapsed().as_millis() as i64,
                        json!({}),
                        Some(&e.to_string()),
                    )
                }
            }
        };

        let _ = task.reply.send(response);
    }
}
