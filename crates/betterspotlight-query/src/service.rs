//! The query service: IPC dispatch and the search pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use betterspotlight_domain::constants::settings as keys;
use betterspotlight_domain::entities::{FeedbackAction, Item};
use betterspotlight_domain::ports::{DenseIndex, EmbeddingBackend, QaBackend, RerankBackend};
use betterspotlight_domain::value_objects::{JoinedHit, QueryMode, QueueSource, SearchFilters};
use betterspotlight_domain::{Error, Result};
use betterspotlight_inference::{HashingEmbedder, OverlapReranker, SpanQa};
use betterspotlight_ipc::service::MethodHandler;
use betterspotlight_ipc::SocketClient;
use betterspotlight_store::SqliteStore;
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::{QueryCache, QueryCacheConfig};
use crate::dense::VectorIndexManager;
use crate::learning::{LearningEngine, LearningSettings};
use crate::planner;
use crate::rerank::{run_cascade, CascadeConfig, CascadeReport};
use crate::retrieval::{
    apply_clipboard_boosts, apply_frequency_boosts, merge_candidates, sort_by_score, Candidate,
    ClipboardHints, MergeWeights,
};
use crate::{health, snippet};

/// Construction options: IPC clients are optional so the core also runs
/// standalone (tests, degraded mode).
#[derive(Default)]
pub struct QueryServiceOptions {
    pub data_dir: PathBuf,
    pub inference: Option<SocketClient>,
    pub indexer: Option<SocketClient>,
}

/// Rerank backend that offloads to the inference service.
struct RemoteRerank {
    client: SocketClient,
    method: &'static str,
}

#[async_trait]
impl RerankBackend for RemoteRerank {
    fn model_id(&self) -> &str {
        self.method
    }

    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let response = self
            .client
            .send_request(
                self.method,
                Some(json!({"query": query, "passages": passages})),
                2_000,
            )
            .await?;
        let result = response
            .get("result")
            .ok_or_else(|| Error::service_unavailable("rerank offload returned no result"))?;
        if result.get("status").and_then(Value::as_str) != Some("ok") {
            return Err(Error::service_unavailable("rerank offload not ok"));
        }
        Ok(result
            .get("scores")
            .and_then(Value::as_array)
            .map(|scores| {
                scores
                    .iter()
                    .map(|s| s.as_f64().unwrap_or(0.0) as f32)
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// The query service core.
pub struct QueryService {
    store: SqliteStore,
    options: QueryServiceOptions,
    cache: QueryCache,
    /// Typo-rewrite dictionary cache; rebuilt at most once per minute.
    corpus_cache: moka::future::Cache<&'static str, Arc<Vec<String>>>,
    engine: Arc<LearningEngine>,
    vectors: Arc<VectorIndexManager>,
    local_embedder: Arc<HashingEmbedder>,
    local_rerank_fast: Arc<dyn RerankBackend>,
    local_rerank_strong: Arc<dyn RerankBackend>,
    qa: Arc<dyn QaBackend>,
}

impl QueryService {
    /// Build the service: load the persisted ranker and dense generation,
    /// start the learning scheduler.
    ///
    /// # Errors
    ///
    /// Returns a store error when persisted state cannot be read.
    pub async fn start(store: SqliteStore, options: QueryServiceOptions) -> Result<Arc<Self>> {
        let engine = LearningEngine::new(store.clone(), options.data_dir.clone());
        engine.load_model().await?;
        engine.spawn_scheduler();

        let vectors = VectorIndexManager::new(store.clone(), options.data_dir.clone());
        vectors.load_active().await?;

        // Periodic maintenance: fold feedback into frequencies and apply
        // the retention windows.
        let maintenance_store = store.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(10 * 60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = run_maintenance(&maintenance_store).await {
                    tracing::warn!(error = %e, "store maintenance failed");
                }
            }
        });

        Ok(Arc::new(Self {
            store,
            options,
            cache: QueryCache::new(QueryCacheConfig::default()),
            corpus_cache: moka::future::Cache::builder()
                .max_capacity(4)
                .time_to_live(std::time::Duration::from_secs(60))
                .build(),
            engine,
            vectors,
            local_embedder: Arc::new(HashingEmbedder::new("native-embed-strong", 384)),
            local_rerank_fast: Arc::new(OverlapReranker::new("native-rerank-fast")),
            local_rerank_strong: Arc::new(OverlapReranker::new("native-rerank-strong")),
            qa: Arc::new(SpanQa::new("native-qa-extractive")),
        }))
    }

    /// The learning engine (tests drive it directly).
    #[must_use]
    pub fn engine(&self) -> Arc<LearningEngine> {
        Arc::clone(&self.engine)
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

    /// Dispatch one IPC method.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown methods; per-method errors otherwise.
    pub async fn dispatch(self: &Arc<Self>, method: &str, params: Value) -> Result<Value> {
        match method {
            "search" => self.handle_search(&params).await,
            "getHealth" => self.handle_get_health().await,
            "getHealthDetails" => self.handle_get_health_details(&params).await,
            "getAnswerSnippet" => self.handle_answer_snippet(&params).await,
            "recordFeedback" => self.handle_record_feedback(&params).await,
            "getFrequency" => self.handle_get_frequency(&params).await,
            "record_interaction" => self.handle_record_interaction(&params).await,
            "rebuild_vector_index" | "rebuildVectorIndex" => {
                self.handle_rebuild_vector_index().await
            }
            "record_behavior_event" => self.engine.record_behavior_event(params).await,
            "set_learning_consent" => self.engine.set_learning_consent(&params).await,
            "get_learning_health" => {
                let settings = LearningSettings::load(&self.store).await?;
                Ok(json!({"learning": self.engine.learning_health(&settings).await?}))
            }
            "trigger_learning_cycle" => self.engine.run_cycle(true).await,
            other => Err(Error::not_found(format!("method '{other}'"))),
        }
    }

    // ── search ──────────────────────────────────────────────────────────

    async fn handle_search(&self, params: &Value) -> Result<Value> {
        let raw_query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'query' is required"))?;
        let limit = params
            .get("limit")
            .and_then(Value::as_i64)
            .unwrap_or(20)
            .clamp(1, 100);
        let debug_requested = params
            .get("debug")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mode = match params.get("queryMode").and_then(Value::as_str) {
            None => QueryMode::Auto,
            Some(raw) => raw
                .parse()
                .map_err(|()| Error::invalid_params(format!("unknown queryMode '{raw}'")))?,
        };
        let caller_filters: SearchFilters = match params.get("filters") {
            None | Some(Value::Null) => SearchFilters::default(),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| Error::invalid_params(format!("malformed filters: {e}")))?,
        };
        let clipboard = ClipboardHints {
            basename: params
                .get("clipboardBasename")
                .and_then(Value::as_str)
                .map(str::to_owned),
            dirname: params
                .get("clipboardDirname")
                .and_then(Value::as_str)
                .map(str::to_owned),
            extension: params
                .get("clipboardExtension")
                .and_then(Value::as_str)
                .map(str::to_owned),
        };

        // 1-2. Normalize + plan.
        let normalized = planner::normalize(raw_query);
        let cache_key = format!(
            "{}|{}|{}",
            mode.as_str(),
            normalized,
            serde_json::to_string(&caller_filters).unwrap_or_default()
        );
        if !debug_requested {
            if let Some(cached) = self.cache.get(&cache_key) {
                return Ok(cached);
            }
        }
        let parsed = planner::parse(&normalized);

        // 3. Merge caller filters with parser-derived constraints.
        let mut filters = caller_filters;
        filters.merge(&parsed.filters);

        // 4. Query-mode handling / typo rewrite.
        let corpus = if mode == QueryMode::Strict {
            Arc::new(Vec::new())
        } else {
            self.corpus_terms().await?
        };
        let rewrite = planner::rewrite(&parsed.cleaned_query, mode, &corpus);

        // 5. Lexical retrieval with pushdown; auto mode falls back to the
        // relaxed sanitizer when the strict pass finds nothing.
        let fetch = limit * 3;
        let relaxed = mode == QueryMode::Relaxed;
        let mut lexical = self
            .store
            .search_fts_joined(&rewrite.query, fetch, relaxed, &filters)
            .await?;
        if lexical.is_empty() && mode == QueryMode::Auto {
            lexical = self
                .store
                .search_fts_joined(&rewrite.query, fetch, true, &filters)
                .await?;
        }

        // 6. Semantic retrieval.
        let embedding_enabled = self.store.setting_bool(keys::EMBEDDING_ENABLED, false).await?;
        let mut semantic: Vec<(i64, f32)> = Vec::new();
        let mut semantic_skip_reason: Option<&str> = None;
        if embedding_enabled {
            match self.vectors.active() {
                None => semantic_skip_reason = Some("active_generation_missing"),
                Some(index) => {
                    let vector = self.query_embedding(&parsed.cleaned_query).await;
                    match vector {
                        Some(v) => semantic = index.search(&v, 50).await?,
                        None => semantic_skip_reason = Some("embedding_unavailable"),
                    }
                }
            }
        } else {
            semantic_skip_reason = Some("embedding_disabled");
        }

        // Metadata for semantic-only candidates.
        let mut item_meta: HashMap<i64, JoinedHit> = HashMap::new();
        for hit in &lexical {
            item_meta.entry(hit.item_id).or_insert_with(|| hit.clone());
        }
        for (item_id, _) in &semantic {
            if !item_meta.contains_key(item_id) {
                if let Some(item) = self.store.get_item_by_id(*item_id).await? {
                    item_meta.insert(*item_id, joined_from_item(&item));
                }
            }
        }

        // 7-8. Merge with adaptive weights + semantic-only safety.
        let meaningful = planner::meaningful_token_count(&parsed.cleaned_query);
        let (weights, adaptive) = MergeWeights::select(meaningful, parsed.has_type_hint);
        let threshold = self
            .store
            .setting_f64(keys::SEMANTIC_SIMILARITY_THRESHOLD, 0.7)
            .await?;
        let (mut candidates, admission) =
            merge_candidates(&lexical, &semantic, &item_meta, weights, threshold);

        // Frequency, pinned and clipboard boosts.
        let candidate_ids: Vec<i64> = candidates.iter().map(|c| c.item_id).collect();
        let frequencies = self.store.get_frequencies_batch(&candidate_ids).await?;
        apply_frequency_boosts(&mut candidates, &frequencies);
        let clipboard_boosted = apply_clipboard_boosts(&mut candidates, &clipboard);
        sort_by_score(&mut candidates);

        // 9. Reranker cascade.
        let cascade_report = self
            .run_rerank_cascade(&mut candidates, &parsed.cleaned_query)
            .await?;

        // 10. Personalization blend.
        let learning = LearningSettings::load(&self.store).await?;
        let (serving_allowed, model) = self.engine.serving(&learning);
        let mut delta_top10 = 0.0f64;
        if let Some(model) = &model {
            for (idx, candidate) in candidates.iter_mut().enumerate() {
                let features = [
                    candidate.lexical_score,
                    candidate.semantic_score,
                    1.0 / (1.0 + idx as f64),
                    0.5,
                    0.0,
                    (normalized.len() as f64 / 64.0).min(1.0),
                ];
                let personal = model.score(&features);
                let blended = (1.0 - learning.blend_alpha) * candidate.score
                    + learning.blend_alpha * personal;
                if idx < 10 {
                    delta_top10 += (blended - candidate.score).abs();
                }
                candidate.score = blended;
            }
            sort_by_score(&mut candidates);
        }
        let online_applied = serving_allowed && model.is_some() && delta_top10.abs() > 1e-9;

        // Feed non-opened results into the replay reservoir.
        if learning.behavior_stream_enabled {
            for (idx, candidate) in candidates.iter().take(5).enumerate() {
                let features = json!({
                    "lexical": candidate.lexical_score,
                    "semantic": candidate.semantic_score,
                    "positionDecay": 1.0 / (1.0 + idx as f64),
                    "attributionConfidence": 0.0,
                    "hasContext": 0.0,
                    "queryLenNorm": (normalized.len() as f64 / 64.0).min(1.0),
                });
                let _ = self
                    .engine
                    .offer_negative(&normalized, candidate.item_id, &features)
                    .await;
            }
        }

        // 11-13. Availability annotation + truncation.
        candidates.truncate(limit as usize);
        let top_ids: Vec<i64> = candidates.iter().map(|c| c.item_id).collect();
        let with_content = self.store.items_with_content(&top_ids).await?;
        let gap_messages = self.store.extraction_failures_for_items(&top_ids).await?;

        let results: Vec<Value> = candidates
            .iter()
            .map(|c| {
                let offline = gap_messages
                    .get(&c.item_id)
                    .is_some_and(|m| m.contains("cloud placeholder"));
                let content_available = with_content.contains(&c.item_id) && !offline;
                let mut result = json!({
                    "itemId": c.item_id,
                    "path": c.path,
                    "name": c.name,
                    "kind": c.kind.as_str(),
                    "score": c.score,
                    "lexicalScore": c.lexical_score,
                    "semanticScore": c.semantic_score,
                    "snippet": c.snippet,
                    "contentAvailable": content_available,
                });
                if let Some(obj) = result.as_object_mut() {
                    if let Some(chunk_id) = &c.chunk_id {
                        obj.insert("chunkId".to_owned(), Value::from(chunk_id.clone()));
                    }
                    if offline {
                        obj.insert(
                            "availabilityStatus".to_owned(),
                            Value::from("offline_placeholder"),
                        );
                    }
                }
                result
            })
            .collect();

        let mut response = json!({
            "results": results,
            "total": candidates.len(),
            "queryMode": mode.as_str(),
        });
        if debug_requested {
            if let Some(obj) = response.as_object_mut() {
                obj.insert(
                    "debugInfo".to_owned(),
                    self.debug_info(
                        &parsed,
                        &rewrite,
                        weights,
                        adaptive,
                        admission.admitted,
                        admission.suppressed,
                        semantic.len(),
                        semantic_skip_reason,
                        cascade_report,
                        &learning,
                        serving_allowed,
                        online_applied,
                        delta_top10,
                        &clipboard,
                        clipboard_boosted,
                    ),
                );
            }
        } else {
            self.cache.put(&cache_key, response.clone());
        }
        Ok(response)
    }

    async fn corpus_terms(&self) -> Result<Arc<Vec<String>>> {
        if let Some(terms) = self.corpus_cache.get("corpus").await {
            return Ok(terms);
        }
        let terms = Arc::new(self.store.corpus_name_terms(500).await?);
        self.corpus_cache.insert("corpus", Arc::clone(&terms)).await;
        Ok(terms)
    }

    async fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        let offload = self
            .store
            .setting_bool(keys::INFERENCE_EMBED_OFFLOAD_ENABLED, true)
            .await
            .unwrap_or(true);
        if offload {
            if let Some(client) = self.options.inference.as_ref().filter(|c| c.is_connected()) {
                let response = client
                    .send_request("embed_query", Some(json!({"text": query})), 2_000)
                    .await
                    .ok()?;
                let result = response.get("result")?;
                if result.get("status").and_then(Value::as_str) == Some("ok") {
                    return result.get("embedding").and_then(Value::as_array).map(|v| {
                        v.iter()
                            .map(|x| x.as_f64().unwrap_or(0.0) as f32)
                            .collect()
                    });
                }
                debug!("embed offload declined, falling back to local embedder");
            }
        }
        Some(self.local_embedder.embed_one(query))
    }

    async fn run_rerank_cascade(
        &self,
        candidates: &mut Vec<Candidate>,
        query: &str,
    ) -> Result<CascadeReport> {
        let config = CascadeConfig {
            enabled: self
                .store
                .setting_bool(keys::RERANKER_CASCADE_ENABLED, true)
                .await?,
            stage1_max: self.store.setting_i64(keys::RERANKER_STAGE1_MAX, 50).await? as usize,
            stage2_max: self.store.setting_i64(keys::RERANKER_STAGE2_MAX, 10).await? as usize,
        };

        let offload = self
            .store
            .setting_bool(keys::INFERENCE_RERANK_OFFLOAD_ENABLED, true)
            .await?;
        let remote = self
            .options
            .inference
            .as_ref()
            .filter(|c| offload && c.is_connected());
        let (fast, strong): (Arc<dyn RerankBackend>, Arc<dyn RerankBackend>) = match remote {
            Some(client) => (
                Arc::new(RemoteRerank {
                    client: client.clone(),
                    method: "rerank_fast",
                }),
                Arc::new(RemoteRerank {
                    client: client.clone(),
                    method: "rerank_strong",
                }),
            ),
            None => (
                Arc::clone(&self.local_rerank_fast),
                Arc::clone(&self.local_rerank_strong),
            ),
        };

        match run_cascade(candidates, query, &fast, &strong, config).await {
            Ok(report) => Ok(report),
            Err(e) => {
                // Offload failure degrades to unranked candidates, never a
                // failed search.
                debug!(error = %e, "rerank cascade skipped");
                Ok(CascadeReport::default())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn debug_info(
        &self,
        parsed: &planner::ParsedQuery,
        rewrite: &planner::RewriteOutcome,
        weights: MergeWeights,
        adaptive: bool,
        admitted: usize,
        suppressed: usize,
        semantic_candidates: usize,
        semantic_skip_reason: Option<&str>,
        cascade: CascadeReport,
        learning: &LearningSettings,
        serving_allowed: bool,
        online_applied: bool,
        delta_top10: f64,
        clipboard: &ClipboardHints,
        clipboard_boosted: usize,
    ) -> Value {
        json!({
            "queryAfterParse": parsed.cleaned_query,
            "parsedTypes": parsed.extracted_types,
            "plannerApplied": parsed.has_type_hint,
            "plannerReason": if parsed.has_type_hint { "trailing_type_token" } else { "none" },
            "rewriteApplied": rewrite.applied,
            "rewriteReason": rewrite.reason,
            "correctedTokens": rewrite.corrected_tokens,
            "lexicalWeight": weights.lexical,
            "semanticWeight": weights.semantic,
            "adaptiveMergeApplied": adaptive,
            "semanticCandidates": semantic_candidates,
            "semanticOnlyAdmittedCount": admitted,
            "semanticOnlySuppressedCount": suppressed,
            "indexHealth": {
                "queueSource": QueueSource::Unavailable.as_str(),
                "semanticSkipReason": semantic_skip_reason.map_or(Value::Null, Value::from),
            },
            "rerankerStagesApplied": cascade,
            "onlineRankerRolloutMode": learning.rollout_mode.as_str(),
            "onlineRankerServingAllowed": serving_allowed,
            "onlineRankerApplied": online_applied,
            "onlineRankerDeltaTop10": delta_top10,
            "onlineRankerBlendAlpha": learning.blend_alpha,
            "clipboardSignalsProvided": clipboard.provided(),
            "clipboardSignalBoostedResults": clipboard_boosted,
        })
    }

    // ── health ──────────────────────────────────────────────────────────

    async fn handle_get_health(&self) -> Result<Value> {
        let store_health = self.store.get_health().await?;
        let (critical, expected) = self.store.failure_counts().await?;

        let mut queue_source = QueueSource::Unavailable;
        let mut queue = json!({
            "queuePending": 0,
            "queueInProgress": 0,
            "queuePreparing": 0,
            "queueCoalesced": 0,
        });
        if let Some(client) = self.options.indexer.as_ref().filter(|c| c.is_connected()) {
            if let Ok(response) = client.send_request("getQueueStatus", None, 1_500).await {
                if let Some(result) = response.get("result") {
                    queue_source = QueueSource::IndexerRpc;
                    queue = json!({
                        "queuePending": result.get("pending").cloned().unwrap_or(0.into()),
                        "queueInProgress": result.get("processing").cloned().unwrap_or(0.into()),
                        "queuePreparing": result.get("preparing").cloned().unwrap_or(0.into()),
                        "queueCoalesced": result.get("coalesced").cloned().unwrap_or(0.into()),
                        "staleDropped": result.get("staleDropped").cloned().unwrap_or(0.into()),
                        "writerBatchDepth": result.get("writerBatchDepth").cloned().unwrap_or(0.into()),
                        "prepWorkers": result.get("prepWorkers").cloned().unwrap_or(0.into()),
                    });
                }
            }
        }

        let mut inference_connected = false;
        let mut inference_roles = Value::Null;
        if let Some(client) = self.options.inference.as_ref().filter(|c| c.is_connected()) {
            if let Ok(response) = client.send_request("get_inference_health", None, 1_500).await {
                if let Some(result) = response.get("result") {
                    inference_connected = true;
                    inference_roles = result
                        .get("roleStatusByModel")
                        .cloned()
                        .unwrap_or(Value::Null);
                }
            }
        }

        let mut body = json!({
            "status": "ok",
            "isHealthy": store_health.is_healthy,
            "totalIndexedItems": store_health.total_indexed_items,
            "totalChunks": store_health.total_chunks,
            "itemsWithoutContent": store_health.items_without_content,
            "ftsIndexSize": store_health.fts_index_size,
            "criticalFailures": critical,
            "expectedGapFailures": expected,
            "healthStatusReason": health::status_reason(&store_health, critical),
            "queueSource": queue_source.as_str(),
            "retrievalAdvisory": health::advisory_json(health::retrieval_advisory(&store_health)),
            "inferenceServiceConnected": inference_connected,
            "inferenceRoleStatusByModel": inference_roles,
            "processStats": {
                "query": {
                    "available": true,
                    "memoryBytes": health::self_memory_bytes(),
                }
            },
        });
        if let (Some(obj), Value::Object(queue_map)) = (body.as_object_mut(), queue) {
            for (k, v) in queue_map {
                obj.insert(k, v);
            }
        }
        Ok(body)
    }

    async fn handle_get_health_details(&self, params: &Value) -> Result<Value> {
        let limit = params
            .get("limit")
            .and_then(Value::as_i64)
            .unwrap_or(50)
            .clamp(1, 500);
        let offset = params.get("offset").and_then(Value::as_i64).unwrap_or(0).max(0);

        let failures: Vec<Value> = self
            .store
            .failures_page(limit, offset)
            .await?
            .into_iter()
            .map(|f| {
                let severity = f.severity();
                json!({
                    "itemId": f.item_id,
                    "path": f.item_path,
                    "stage": f.stage,
                    "message": f.message,
                    "failureCount": f.failure_count,
                    "firstFailedAt": f.first_failed_at,
                    "lastFailedAt": f.last_failed_at,
                    "severity": severity.as_str(),
                })
            })
            .collect();

        Ok(json!({
            "failures": failures,
            "processStats": {
                "query": {"available": true, "memoryBytes": health::self_memory_bytes()},
            },
            "queryStats": self.cache.stats(),
            "bsignore": {"active": false, "patterns": []},
        }))
    }

    // ── snippets, feedback, frequency ───────────────────────────────────

    async fn handle_answer_snippet(&self, params: &Value) -> Result<Value> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'query' is required"))?;
        let enabled = self.store.setting_bool(keys::QA_SNIPPET_ENABLED, true).await?;
        snippet::answer_snippet(
            &self.store,
            &self.qa,
            enabled,
            query,
            params.get("path").and_then(Value::as_str),
            params.get("itemId").and_then(Value::as_i64),
            params
                .get("maxChars")
                .and_then(Value::as_u64)
                .map(|v| v as usize),
        )
        .await
    }

    async fn handle_record_feedback(&self, params: &Value) -> Result<Value> {
        let item_id = match params.get("itemId").and_then(Value::as_i64) {
            Some(id) => id,
            None => {
                let path = params
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_params("'itemId' or 'path' is required"))?;
                self.store
                    .get_item_by_path(path)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("item '{path}'")))?
                    .id
            }
        };
        let action_raw = params
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'action' is required"))?;
        let action: FeedbackAction = action_raw
            .parse()
            .map_err(|()| Error::invalid_params(format!("unknown action '{action_raw}'")))?;
        let query = params.get("query").and_then(Value::as_str).unwrap_or("");
        let position = params
            .get("resultPosition")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        self.store
            .record_feedback(item_id, action, query, position)
            .await?;
        if action == FeedbackAction::Opened {
            self.store.increment_frequency(item_id).await?;
        }
        Ok(json!({"recorded": true}))
    }

    async fn handle_get_frequency(&self, params: &Value) -> Result<Value> {
        let item_id = params
            .get("itemId")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::invalid_params("'itemId' is required"))?;
        let row = self.store.get_frequency(item_id).await?.unwrap_or_default();
        Ok(json!({
            "itemId": item_id,
            "openCount": row.open_count,
            "lastOpenedAt": row.last_opened_at,
            "totalInteractions": row.total_interactions,
        }))
    }

    async fn handle_record_interaction(&self, params: &Value) -> Result<Value> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'query' is required"))?;
        let item_id = params
            .get("itemId")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::invalid_params("'itemId' is required"))?;
        let path = params.get("path").and_then(Value::as_str).unwrap_or("");
        let match_type = params
            .get("matchType")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let position = params
            .get("resultPosition")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let app_context = params.get("appContext").and_then(Value::as_str);

        self.store
            .record_interaction(query, item_id, path, match_type, position, app_context)
            .await?;
        Ok(json!({"recorded": true}))
    }

    async fn handle_rebuild_vector_index(&self) -> Result<Value> {
        let embedder: &dyn EmbeddingBackend = self.local_embedder.as_ref();
        let generation = self.vectors.rebuild(embedder).await?;
        Ok(json!({"status": "ok", "targetGeneration": generation}))
    }
}

async fn run_maintenance(store: &SqliteStore) -> Result<()> {
    store.aggregate_feedback().await?;
    let feedback_days = store.setting_i64(keys::FEEDBACK_RETENTION_DAYS, 90).await?;
    store.cleanup_old_feedback(feedback_days).await?;
    let interaction_days = store
        .setting_i64(keys::INTERACTION_RETENTION_DAYS, 180)
        .await?;
    store.cleanup_old_interactions(interaction_days).await?;
    let behavior_days = store.setting_i64(keys::BEHAVIOR_RAW_RETENTION_DAYS, 30).await?;
    store.cleanup_old_behavior_events(behavior_days).await?;
    Ok(())
}

fn joined_from_item(item: &Item) -> JoinedHit {
    JoinedHit {
        item_id: item.id,
        path: item.path.clone(),
        name: item.name.clone(),
        kind: item.kind,
        extension: item.extension.clone(),
        size: item.size,
        modified_at: item.modified_at,
        is_pinned: item.is_pinned,
        chunk_id: String::new(),
        bm25_score: 0.0,
        snippet: String::new(),
    }
}
