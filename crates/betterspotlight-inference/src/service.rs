//! Inference service: method dispatch, request envelopes, cancellation
//! tokens and health.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use betterspotlight_domain::utils::time;
use betterspotlight_domain::value_objects::{AdmissionVerdict, RequestEnvelope, Role};
use betterspotlight_domain::{Error, Result};
use betterspotlight_ipc::service::MethodHandler;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::backends::{HashingEmbedder, OverlapReranker, SpanQa};
use crate::supervisor_actor::InferenceSupervisorActor;
use crate::worker::{status_payload, TaskExecutor, Worker, WorkerTask};

/// Cancel tokens are garbage-collected after this long.
const CANCEL_TOKEN_TTL_MS: i64 = 10 * 60 * 1_000;

/// Wait budget for a worker reply when the envelope has no deadline.
const DEFAULT_REPLY_TIMEOUT_MS: u64 = 30_000;

/// The inference service core.
pub struct InferenceService {
    workers: HashMap<Role, Arc<Worker>>,
    actor: Arc<InferenceSupervisorActor>,
    cancelled: Arc<DashMap<String, i64>>,
    request_seq: AtomicU64,
}

impl InferenceService {
    /// Build workers for every role with the native backends.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let actor = Arc::new(InferenceSupervisorActor::new());
        let cancelled: Arc<DashMap<String, i64>> = Arc::new(DashMap::new());
        let global_live = Arc::new(AtomicUsize::new(0));
        let global_rebuild = Arc::new(AtomicUsize::new(0));

        let embed_strong = Arc::new(HashingEmbedder::new("native-embed-strong", 384));
        let embed_fast = Arc::new(HashingEmbedder::new("native-embed-fast", 128));
        let rerank_strong = Arc::new(OverlapReranker::new("native-rerank-strong"));
        let rerank_fast = Arc::new(OverlapReranker::new("native-rerank-fast"));
        let qa = Arc::new(SpanQa::new("native-qa-extractive"));

        let mut workers = HashMap::new();
        for role in Role::ALL {
            let executor: TaskExecutor = match role {
                Role::EmbedStrong | Role::RebuildEmbedStrong => {
                    embed_executor(Arc::clone(&embed_strong))
                }
                Role::EmbedFast | Role::RebuildEmbedFast => {
                    embed_executor(Arc::clone(&embed_fast))
                }
                Role::RerankStrong => rerank_executor(Arc::clone(&rerank_strong)),
                Role::RerankFast => rerank_executor(Arc::clone(&rerank_fast)),
                Role::QaExtractive => qa_executor(Arc::clone(&qa)),
            };
            let model_id = match role {
                Role::EmbedStrong | Role::RebuildEmbedStrong => "native-embed-strong",
                Role::EmbedFast | Role::RebuildEmbedFast => "native-embed-fast",
                Role::RerankStrong => "native-rerank-strong",
                Role::RerankFast => "native-rerank-fast",
                Role::QaExtractive => "native-qa-extractive",
            };
            workers.insert(
                role,
                Worker::spawn(
                    role,
                    model_id,
                    executor,
                    Arc::clone(&actor),
                    Arc::clone(&cancelled),
                    Arc::clone(&global_live),
                    Arc::clone(&global_rebuild),
                ),
            );
        }

        let service = Arc::new(Self {
            workers,
            actor,
            cancelled,
            request_seq: AtomicU64::new(1),
        });
        service.spawn_token_gc();
        service
    }

    fn spawn_token_gc(self: &Arc<Self>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let cutoff = time::epoch_millis() - CANCEL_TOKEN_TTL_MS;
                service.cancelled.retain(|_, stamp| *stamp > cutoff);
            }
        });
    }

    /// Stop every worker thread.
    pub fn shutdown(&self) {
        for worker in self.workers.values() {
            worker.stop();
        }
    }

    /// Build the IPC method handler backed by this service.
    #[must_use]
    pub fn method_handler(self: &Arc<Self>) -> MethodHandler {
        let service = Arc::clone(self);
        Arc::new(move |method: String, params: Value| {
            let service = Arc::clone(&service);
            Box::pin(async move { service.dispatch(&method, params).await })
        })
    }

    /// Dispatch one method call.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for unknown methods and `INVALID_PARAMS` for
    /// malformed parameters; execution-level failures come back as result
    /// objects with a non-`ok` status.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "embed_query" | "embed_passages" | "rerank_fast" | "rerank_strong" | "qa_extract" => {
                self.dispatch_model_call(method, params).await
            }
            "cancel_request" => self.handle_cancel(&params),
            "get_inference_health" => Ok(self.health()),
            other => Err(Error::not_found(format!("method '{other}'"))),
        }
    }

    async fn dispatch_model_call(&self, method: &str, params: Value) -> Result<Value> {
        let envelope = self.parse_envelope(&params);
        let role = route_role(method, &params);
        let worker = self
            .workers
            .get(&role)
            .ok_or_else(|| Error::internal(format!("no worker for role {}", role.as_str())))?;

        // Expired deadlines short-circuit before admission.
        if envelope.expired(time::epoch_millis()) {
            return Ok(status_payload(
                "timeout",
                role,
                "",
                0,
                json!({}),
                Some("deadline already expired at entry"),
            ));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let verdict = worker.submit(WorkerTask {
            method: method.to_owned(),
            envelope: envelope.clone(),
            params,
            reply: reply_tx,
        });
        if let AdmissionVerdict::Rejected(reason) = verdict {
            return Ok(status_payload(
                "rejected",
                role,
                "",
                0,
                json!({}),
                Some(&reason),
            ));
        }

        let wait_ms = if envelope.deadline_ms > 0 {
            (envelope.deadline_ms - time::epoch_millis()).max(1) as u64
        } else {
            DEFAULT_REPLY_TIMEOUT_MS
        };
        match tokio::time::timeout(Duration::from_millis(wait_ms), reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Ok(status_payload(
                "failed",
                role,
                "",
                0,
                json!({}),
                Some("worker dropped the request"),
            )),
            Err(_) => Ok(status_payload(
                "timeout",
                role,
                "",
                0,
                json!({}),
                Some("reply wait budget exhausted"),
            )),
        }
    }

    fn parse_envelope(&self, params: &Value) -> RequestEnvelope {
        let fallback_id = || {
            format!(
                "req-{}",
                self.request_seq.fetch_add(1, Ordering::SeqCst)
            )
        };
        RequestEnvelope {
            request_id: params
                .get("requestId")
                .and_then(Value::as_str)
                .map_or_else(fallback_id, str::to_owned),
            cancel_token: params
                .get("cancelToken")
                .and_then(Value::as_str)
                .map(str::to_owned),
            trace_id: params
                .get("traceId")
                .and_then(Value::as_str)
                .map(str::to_owned),
            priority: params
                .get("priority")
                .and_then(Value::as_str)
                .map(str::to_owned),
            deadline_ms: params.get("deadlineMs").and_then(Value::as_i64).unwrap_or(0),
        }
    }

    fn handle_cancel(&self, params: &Value) -> Result<Value> {
        let token = params
            .get("cancelToken")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'cancelToken' is required"))?;
        self.cancelled.insert(token.to_owned(), time::epoch_millis());
        Ok(json!({
            "status": "ok",
            "modelRole": "none",
            "cancelled": true,
        }))
    }

    fn health(&self) -> Value {
        let mut queue_depth = serde_json::Map::new();
        let mut timeouts = serde_json::Map::new();
        let mut failures = serde_json::Map::new();
        for (role, worker) in &self.workers {
            queue_depth.insert(role.as_str().to_owned(), worker.queue_depth().into());
            timeouts.insert(
                role.as_str().to_owned(),
                worker.counters.timed_out.load(Ordering::SeqCst).into(),
            );
            failures.insert(
                role.as_str().to_owned(),
                worker.counters.failed.load(Ordering::SeqCst).into(),
            );
        }
        json!({
            "status": "ok",
            "modelRole": "none",
            "roleStatusByModel": self.actor.state_by_role(),
            "queueDepthByRole": Value::Object(queue_depth),
            "timeoutCountByRole": Value::Object(timeouts),
            "failureCountByRole": Value::Object(failures),
            "restartCountByRole": self.actor.restart_count_by_role(),
            "restartBudgetExhaustedByRole": self.actor.budget_exhausted_by_role(),
        })
    }
}

/// Route a method (plus params hints) to its worker role.
fn route_role(method: &str, params: &Value) -> Role {
    let rebuild = params
        .get("rebuild")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let fast = params.get("fast").and_then(Value::as_bool).unwrap_or(false);
    match method {
        "embed_query" | "embed_passages" => match (rebuild, fast) {
            (true, true) => Role::RebuildEmbedFast,
            (true, false) => Role::RebuildEmbedStrong,
            (false, true) => Role::EmbedFast,
            (false, false) => Role::EmbedStrong,
        },
        "rerank_fast" => Role::RerankFast,
        "rerank_strong" => Role::RerankStrong,
        _ => Role::QaExtractive,
    }
}

fn embed_executor(embedder: Arc<HashingEmbedder>) -> TaskExecutor {
    Arc::new(move |method: &str, params: &Value| {
        if method == "embed_query" {
            let text = params
                .get("text")
                .or_else(|| params.get("query"))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_params("'text' is required"))?;
            let vector = embedder.embed_one(text);
            Ok(json!({"embedding": vector, "dims": vector.len()}))
        } else {
            let texts: Vec<String> = params
                .get("texts")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::invalid_params("'texts' array is required"))?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect();
            let embeddings: Vec<Vec<f32>> = texts.iter().map(|t| embedder.embed_one(t)).collect();
            Ok(json!({"embeddings": embeddings, "count": embeddings.len()}))
        }
    })
}

fn rerank_executor(reranker: Arc<OverlapReranker>) -> TaskExecutor {
    Arc::new(move |_method: &str, params: &Value| {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'query' is required"))?;
        let passages: Vec<String> = params
            .get("passages")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_params("'passages' array is required"))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        let query_tokens: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(str::to_owned)
            .collect();
        let scores: Vec<f32> = passages
            .iter()
            .map(|p| reranker.score_one(&query_tokens, p))
            .collect();
        Ok(json!({"scores": scores}))
    })
}

fn qa_executor(qa: Arc<SpanQa>) -> TaskExecutor {
    Arc::new(move |_method: &str, params: &Value| {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'query' is required"))?;
        let passages: Vec<String> = params
            .get("passages")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_params("'passages' array is required"))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        Ok(match qa.extract_span(query, &passages) {
            Some(span) => json!({
                "answer": span.text,
                "confidence": span.confidence,
                "passageIndex": span.passage_index,
            }),
            None => json!({"answer": Value::Null}),
        })
    })
}
