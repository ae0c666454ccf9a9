//! Learning engine: behavior ingestion, the idle-cycle reason ladder, the
//! cycle scheduler, training cycles with promotion gates, and serving
//! state for the ranking blend.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use betterspotlight_domain::constants::learning::{
    self as consts, ATTRIBUTION_CONFIDENCE_MIN, CYCLE_COOLDOWN_SECS, MAX_TRAINING_BATCH_SIZE,
    ONLINE_RANKER_MODEL_NAME, RECENT_LEARNING_CYCLES_LIMIT,
};
use betterspotlight_domain::constants::settings as keys;
use betterspotlight_domain::entities::{
    BehaviorEvent, CycleRecord, CycleStatus, LearningBackend, RolloutMode, TrainingExample,
};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use betterspotlight_store::SqliteStore;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::gates;
use super::ranker::{OnlineRanker, TrainingMetrics};

/// Settings snapshot driving one learning decision.
#[derive(Debug, Clone, Copy)]
pub struct LearningSettings {
    pub learning_enabled: bool,
    pub behavior_stream_enabled: bool,
    pub pause_on_user_input: bool,
    pub rollout_mode: RolloutMode,
    pub blend_alpha: f64,
    pub min_examples: i64,
    pub epochs: u32,
    pub learning_rate: f64,
    pub negative_sample_ratio: f64,
    pub latency_regression_pct_max: f64,
    pub prediction_failure_rate_max: f64,
    pub saturation_rate_max: f64,
}

impl LearningSettings {
    /// Read the current values from the settings relation.
    ///
    /// # Errors
    ///
    /// Returns a database error when a read fails.
    pub async fn load(store: &SqliteStore) -> Result<Self> {
        let rollout = store
            .get_setting(keys::ONLINE_RANKER_ROLLOUT_MODE)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(RolloutMode::InstrumentationOnly);
        Ok(Self {
            learning_enabled: store.setting_bool(keys::LEARNING_ENABLED, false).await?,
            behavior_stream_enabled: store
                .setting_bool(keys::BEHAVIOR_STREAM_ENABLED, false)
                .await?,
            pause_on_user_input: store
                .setting_bool(keys::LEARNING_PAUSE_ON_USER_INPUT, true)
                .await?,
            rollout_mode: rollout,
            blend_alpha: store
                .setting_f64(keys::ONLINE_RANKER_BLEND_ALPHA, consts::BLEND_ALPHA_DEFAULT)
                .await?,
            min_examples: store
                .setting_i64(
                    keys::ONLINE_RANKER_MIN_EXAMPLES,
                    consts::MIN_TRAINING_EXAMPLES_DEFAULT,
                )
                .await?,
            epochs: store
                .setting_i64(keys::ONLINE_RANKER_EPOCHS, i64::from(consts::EPOCHS_DEFAULT))
                .await? as u32,
            learning_rate: store
                .setting_f64(
                    keys::ONLINE_RANKER_LEARNING_RATE,
                    consts::LEARNING_RATE_DEFAULT,
                )
                .await?,
            negative_sample_ratio: consts::NEGATIVE_SAMPLE_RATIO_DEFAULT,
            latency_regression_pct_max: store
                .setting_f64(
                    keys::ONLINE_RANKER_PROMOTION_LATENCY_REGRESSION_PCT_MAX,
                    consts::PROMOTION_LATENCY_REGRESSION_PCT_MAX,
                )
                .await?,
            prediction_failure_rate_max: store
                .setting_f64(
                    keys::ONLINE_RANKER_PROMOTION_PREDICTION_FAILURE_RATE_MAX,
                    consts::PROMOTION_PREDICTION_FAILURE_RATE_MAX,
                )
                .await?,
            saturation_rate_max: store
                .setting_f64(
                    keys::ONLINE_RANKER_PROMOTION_SATURATION_RATE_MAX,
                    consts::PROMOTION_SATURATION_RATE_MAX,
                )
                .await?,
        })
    }
}

#[derive(Default)]
struct SchedulerState {
    ticks: u64,
    reason_counts: HashMap<String, u64>,
    last_tick_at_ms: i64,
}

/// The learning core.
pub struct LearningEngine {
    store: SqliteStore,
    data_dir: PathBuf,
    ranker: ArcSwapOption<OnlineRanker>,
    recent_cycles: Mutex<VecDeque<CycleRecord>>,
    scheduler: Mutex<SchedulerState>,
    cycle_running: AtomicBool,
    cycle_index_next: AtomicI64,
    last_cycle_completed_at: Mutex<f64>,
    baseline_latency_us: Mutex<Option<f64>>,
    filtered_out: AtomicU64,
    fallback_missing_model: AtomicU64,
}

impl LearningEngine {
    #[must_use]
    pub fn new(store: SqliteStore, data_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            store,
            data_dir,
            ranker: ArcSwapOption::empty(),
            recent_cycles: Mutex::new(VecDeque::new()),
            scheduler: Mutex::new(SchedulerState::default()),
            cycle_running: AtomicBool::new(false),
            cycle_index_next: AtomicI64::new(1),
            last_cycle_completed_at: Mutex::new(0.0),
            baseline_latency_us: Mutex::new(None),
            filtered_out: AtomicU64::new(0),
            fallback_missing_model: AtomicU64::new(0),
        })
    }

    fn model_path(&self, version: i64) -> PathBuf {
        self.data_dir.join(format!("online-ranker-v{version}.json"))
    }

    /// Load the persisted active model, if any. New instances observe the
    /// persisted learning state unchanged across restarts.
    pub async fn load_model(&self) -> Result<()> {
        let state = self.store.get_model_state(ONLINE_RANKER_MODEL_NAME).await?;
        if state.active_version <= 0 {
            return Ok(());
        }
        match OnlineRanker::load(&self.model_path(state.active_version)) {
            Ok(model) => {
                info!(version = state.active_version, "online ranker loaded");
                self.ranker.store(Some(Arc::new(model)));
            }
            Err(e) => warn!(error = %e, "active ranker version is not readable"),
        }
        Ok(())
    }

    /// Serving decision for one query: `(serving_allowed, model)`.
    /// In blended mode without a readable model, the fallback counter
    /// advances and ranking proceeds with base scores.
    #[must_use]
    pub fn serving(&self, settings: &LearningSettings) -> (bool, Option<Arc<OnlineRanker>>) {
        let allowed = settings.rollout_mode.allows_serving();
        if !allowed {
            return (false, None);
        }
        let model = self.ranker.load_full();
        if model.is_none() {
            self.fallback_missing_model.fetch_add(1, Ordering::SeqCst);
        }
        (true, model)
    }

    /// Feed a non-opened result into the replay reservoir as a negative
    /// candidate.
    pub async fn offer_negative(&self, query: &str, item_id: i64, features: &Value) -> Result<()> {
        self.store.reservoir_offer(query, item_id, features).await
    }

    /// Ingest one behavior event. See the reason ladder for what may
    /// trigger an idle training cycle afterwards.
    ///
    /// # Errors
    ///
    /// `INVALID_PARAMS` for malformed events; database errors propagate.
    pub async fn record_behavior_event(self: &Arc<Self>, params: Value) -> Result<Value> {
        let event: BehaviorEvent = serde_json::from_value(params)
            .map_err(|e| Error::invalid_params(format!("malformed behavior event: {e}")))?;
        let settings = LearningSettings::load(&self.store).await?;

        if event.privacy_flags.any() {
            self.filtered_out.fetch_add(1, Ordering::SeqCst);
            return self
                .event_response(false, true, false, false, None, &settings)
                .await;
        }
        if !settings.behavior_stream_enabled {
            return self
                .event_response(false, false, false, false, None, &settings)
                .await;
        }

        let attributed_positive = event.event_type.is_positive()
            && event.attribution_confidence >= ATTRIBUTION_CONFIDENCE_MIN;
        let recorded = self
            .store
            .insert_behavior_event(&event, attributed_positive)
            .await?;
        if !recorded {
            // Duplicate event id: idempotent no-op.
            return self
                .event_response(false, false, false, false, None, &settings)
                .await;
        }

        if attributed_positive {
            self.store
                .insert_training_example(&positive_example(&event))
                .await?;
        }

        // Idle-cycle gate, evaluated right after recording. The event
        // itself counts as user activity.
        let reason = self.evaluate_cycle_gate(&settings, true).await?;
        let triggered = reason.is_none();
        if triggered {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = engine.run_cycle(false).await {
                    warn!(error = %e, "idle learning cycle failed");
                }
            });
        }

        self.event_response(true, false, attributed_positive, triggered, reason, &settings)
            .await
    }

    #[allow(clippy::fn_params_excessive_bools)]
    async fn event_response(
        &self,
        recorded: bool,
        filtered_out: bool,
        attributed_positive: bool,
        idle_cycle_triggered: bool,
        idle_cycle_reason: Option<&'static str>,
        settings: &LearningSettings,
    ) -> Result<Value> {
        let health = self.learning_health(settings).await?;
        Ok(json!({
            "recorded": recorded,
            "filteredOut": filtered_out,
            "attributedPositive": attributed_positive,
            "idleCycleTriggered": idle_cycle_triggered,
            "idleCycleReason": idle_cycle_reason
                .map_or(Value::Null, |r| Value::from(r)),
            "learningHealth": health,
        }))
    }

    /// The reason ladder. `None` means a cycle may run now.
    async fn evaluate_cycle_gate(
        &self,
        settings: &LearningSettings,
        is_user_activity: bool,
    ) -> Result<Option<&'static str>> {
        if settings.rollout_mode == RolloutMode::InstrumentationOnly {
            return Ok(Some(consts::REASON_ROLLOUT_BLOCKS));
        }
        if settings.pause_on_user_input && is_user_activity {
            return Ok(Some(consts::REASON_USER_ACTIVE));
        }
        let last = *self
            .last_cycle_completed_at
            .lock()
            .map_err(|_| Error::internal("cycle timestamp lock poisoned"))?;
        if last > 0.0 && time::epoch_secs() - last < CYCLE_COOLDOWN_SECS as f64 {
            return Ok(Some(consts::REASON_COOLDOWN));
        }
        if self.store.pending_example_count().await? < settings.min_examples {
            return Ok(Some(consts::REASON_NOT_ENOUGH_EXAMPLES));
        }
        if !settings.learning_enabled {
            return Ok(Some(consts::REASON_LEARNING_DISABLED));
        }
        Ok(None)
    }

    /// Start the periodic scheduler. Interval is settable through the
    /// `BS_TEST_LEARNING_SCHEDULER_INTERVAL_MS` hook.
    pub fn spawn_scheduler(self: &Arc<Self>) {
        let interval_ms = std::env::var(consts::ENV_SCHEDULER_INTERVAL_MS)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(consts::SCHEDULER_INTERVAL_MS_DEFAULT);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = engine.scheduler_tick().await {
                    warn!(error = %e, "learning scheduler tick failed");
                }
            }
        });
    }

    /// One scheduler tick: re-evaluate the ladder, account the reason,
    /// and run a cycle when nothing blocks. `sum(reasonCounts) == ticks`
    /// holds at all times.
    pub async fn scheduler_tick(self: &Arc<Self>) -> Result<()> {
        let settings = LearningSettings::load(&self.store).await?;
        let reason = self.evaluate_cycle_gate(&settings, false).await?;
        let key = reason.unwrap_or(consts::REASON_TRIGGERED);
        {
            let mut scheduler = self
                .scheduler
                .lock()
                .map_err(|_| Error::internal("scheduler lock poisoned"))?;
            scheduler.ticks += 1;
            *scheduler.reason_counts.entry(key.to_owned()).or_insert(0) += 1;
            scheduler.last_tick_at_ms = time::epoch_millis();
        }
        if reason.is_none() {
            if let Err(e) = self.run_cycle(false).await {
                warn!(error = %e, "scheduled learning cycle failed");
            }
        }
        Ok(())
    }

    /// Run one training cycle. Manual triggers bypass the cooldown and
    /// user-activity reasons but still honor rollout and data gates.
    ///
    /// # Errors
    ///
    /// `ALREADY_RUNNING` when a cycle is in flight (manual trigger only).
    pub async fn run_cycle(&self, manual: bool) -> Result<Value> {
        if self.cycle_running.swap(true, Ordering::SeqCst) {
            if manual {
                return Err(Error::already_running("learning cycle in progress"));
            }
            return Ok(json!({"status": "skipped", "reason": "cycle_in_progress"}));
        }
        let outcome = self.run_cycle_inner().await;
        self.cycle_running.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_cycle_inner(&self) -> Result<Value> {
        let settings = LearningSettings::load(&self.store).await?;
        if !settings.rollout_mode.allows_training() {
            return self
                .finish_rejected(consts::REASON_ROLLOUT_BLOCKS, 0, TrainingMetrics::default())
                .await;
        }
        if !settings.learning_enabled {
            return self
                .finish_rejected(consts::REASON_LEARNING_DISABLED, 0, TrainingMetrics::default())
                .await;
        }

        // Compose the batch: all fresh positives plus sampled negatives.
        let positives = self
            .store
            .fetch_training_batch(MAX_TRAINING_BATCH_SIZE as i64)
            .await?;
        if (positives.len() as i64) < settings.min_examples {
            return self
                .finish_rejected(
                    consts::REASON_NOT_ENOUGH_EXAMPLES,
                    positives.len() as i64,
                    TrainingMetrics::default(),
                )
                .await;
        }
        let negative_budget =
            (positives.len() as f64 * settings.negative_sample_ratio).round() as i64;
        let negatives = self.store.reservoir_sample(negative_budget).await?;

        let mut rows: Vec<(Value, i32, f64)> = positives
            .iter()
            .map(|p| (p.features.clone(), p.label, p.weight))
            .collect();
        rows.extend(
            negatives
                .iter()
                .map(|(_, _, features)| (features.clone(), 0, 1.0)),
        );
        let examples_used = rows.len() as i64;

        let state = self.store.get_model_state(ONLINE_RANKER_MODEL_NAME).await?;
        let candidate_version = state.active_version + 1;
        let mut candidate = self
            .ranker
            .load_full()
            .map_or_else(|| OnlineRanker::new(candidate_version), |m| (*m).clone());
        candidate.version = candidate_version;
        let metrics = candidate.train(&rows, settings.epochs, settings.learning_rate);

        // Promotion gates, first failure wins.
        if let Some(reason) = self
            .first_failing_gate(&settings, &positives, &metrics)
            .await?
        {
            return self.finish_rejected(reason, examples_used, metrics).await;
        }

        // Promote: persist weights, advance versions, keep rollback.
        candidate.save(&self.model_path(candidate_version))?;
        let mut next_state = state.clone();
        next_state.rollback_version = state.active_version;
        next_state.active_version = candidate_version;
        next_state.active_backend = LearningBackend::NativeSgd;
        next_state.last_cycle_status = CycleStatus::Succeeded.as_str().to_owned();
        next_state.last_cycle_reason = consts::CYCLE_REASON_PROMOTED.to_owned();
        next_state.cycles_run += 1;
        next_state.promotions += 1;
        self.store.put_model_state(&next_state).await?;

        let consumed: Vec<String> = positives.iter().map(|p| p.sample_id.clone()).collect();
        self.store.mark_examples_consumed(&consumed).await?;
        self.ranker.store(Some(Arc::new(candidate)));
        if let Ok(mut baseline) = self.baseline_latency_us.lock() {
            *baseline = Some(metrics.scoring_latency_us);
        }

        self.push_cycle_record(
            CycleStatus::Succeeded,
            consts::CYCLE_REASON_PROMOTED,
            examples_used,
            &metrics,
        )?;
        info!(version = candidate_version, examples_used, "online ranker promoted");
        Ok(json!({
            "status": CycleStatus::Succeeded.as_str(),
            "reason": consts::CYCLE_REASON_PROMOTED,
            "modelVersion": candidate_version,
            "examplesUsed": examples_used,
            "evalAccuracy": metrics.eval_accuracy,
        }))
    }

    async fn first_failing_gate(
        &self,
        settings: &LearningSettings,
        positives: &[TrainingExample],
        metrics: &TrainingMetrics,
    ) -> Result<Option<&'static str>> {
        let (events, attributed, with_context) = self.store.behavior_coverage().await?;
        let input = gates::GateInput {
            settings,
            batch_positives: positives.len(),
            events,
            attributed,
            with_context,
            metrics,
            baseline_latency_us: self.baseline_latency_us.lock().ok().and_then(|b| *b),
        };
        Ok(gates::first_failing(&input))
    }

    async fn finish_rejected(
        &self,
        reason: &'static str,
        examples_used: i64,
        metrics: TrainingMetrics,
    ) -> Result<Value> {
        let mut state = self.store.get_model_state(ONLINE_RANKER_MODEL_NAME).await?;
        state.last_cycle_status = CycleStatus::Rejected.as_str().to_owned();
        state.last_cycle_reason = reason.to_owned();
        state.cycles_run += 1;
        state.rejections += 1;
        self.store.put_model_state(&state).await?;
        self.push_cycle_record(CycleStatus::Rejected, reason, examples_used, &metrics)?;
        Ok(json!({
            "status": CycleStatus::Rejected.as_str(),
            "reason": reason,
            "examplesUsed": examples_used,
        }))
    }

    fn push_cycle_record(
        &self,
        status: CycleStatus,
        reason: &str,
        examples_used: i64,
        metrics: &TrainingMetrics,
    ) -> Result<()> {
        let now = time::epoch_secs();
        {
            let mut last = self
                .last_cycle_completed_at
                .lock()
                .map_err(|_| Error::internal("cycle timestamp lock poisoned"))?;
            *last = now;
        }
        let mut cycles = self
            .recent_cycles
            .lock()
            .map_err(|_| Error::internal("cycle ring lock poisoned"))?;
        cycles.push_front(CycleRecord {
            cycle_index: self.cycle_index_next.fetch_add(1, Ordering::SeqCst),
            status,
            reason: reason.to_owned(),
            examples_used,
            loss: metrics.train_loss,
            eval_score: metrics.eval_accuracy,
            completed_at: now,
        });
        cycles.truncate(RECENT_LEARNING_CYCLES_LIMIT);
        Ok(())
    }

    /// Bump the missing-model fallback counter (used by the search path).
    pub fn note_fallback_missing_model(&self) {
        self.fallback_missing_model.fetch_add(1, Ordering::SeqCst);
    }

    /// The learning health block shared by several responses.
    ///
    /// # Errors
    ///
    /// Returns a database error when a read fails.
    pub async fn learning_health(&self, settings: &LearningSettings) -> Result<Value> {
        let state = self.store.get_model_state(ONLINE_RANKER_MODEL_NAME).await?;
        let (events, attributed, with_context) = self.store.behavior_coverage().await?;
        let pending = self.store.pending_example_count().await?;
        let model_available = self.ranker.load_full().is_some();

        let scheduler = {
            let scheduler = self
                .scheduler
                .lock()
                .map_err(|_| Error::internal("scheduler lock poisoned"))?;
            json!({
                "ticks": scheduler.ticks,
                "reasonCounts": scheduler.reason_counts.clone(),
                "lastTickAtMs": scheduler.last_tick_at_ms,
            })
        };
        let recent: Vec<Value> = {
            let cycles = self
                .recent_cycles
                .lock()
                .map_err(|_| Error::internal("cycle ring lock poisoned"))?;
            cycles
                .iter()
                .map(|c| {
                    json!({
                        "cycleIndex": c.cycle_index,
                        "status": c.status.as_str(),
                        "reason": c.reason,
                        "examplesUsed": c.examples_used,
                        "loss": if c.loss.is_finite() { Value::from(c.loss) } else { Value::Null },
                        "evalScore": c.eval_score,
                        "completedAt": c.completed_at,
                    })
                })
                .collect()
        };

        Ok(json!({
            "learningEnabled": settings.learning_enabled,
            "behaviorStreamEnabled": settings.behavior_stream_enabled,
            "learningPauseOnUserInput": settings.pause_on_user_input,
            "onlineRankerRolloutMode": settings.rollout_mode.as_str(),
            "modelAvailable": model_available,
            "activeBackend": state.active_backend.as_str(),
            "modelVersion": state.active_version,
            "rollbackVersion": state.rollback_version,
            "lastCycleStatus": state.last_cycle_status,
            "lastCycleReason": state.last_cycle_reason,
            "events": events,
            "positiveExamples": attributed,
            "pendingExamples": pending,
            "filteredOut": self.filtered_out.load(Ordering::SeqCst),
            "fallbackMissingModel": self.fallback_missing_model.load(Ordering::SeqCst),
            "scheduler": scheduler,
            "recentLearningCycles": recent,
            "behaviorCoverageMetrics": {
                "events": events,
                "attributedPositive": attributed,
                "withContextDigest": with_context,
                "attributedRate": if events == 0 { 0.0 } else { attributed as f64 / events as f64 },
                "contextDigestRate": if events == 0 { 0.0 } else { with_context as f64 / events as f64 },
            },
            "attributionMetrics": {
                "confidenceThreshold": ATTRIBUTION_CONFIDENCE_MIN,
                "positiveExamples": attributed,
            },
        }))
    }

    /// Update learning consent/rollout. Invalid rollout strings leave the
    /// state unchanged.
    ///
    /// # Errors
    ///
    /// `INVALID_PARAMS` with `invalid_rollout_mode` for unknown modes.
    pub async fn set_learning_consent(&self, params: &Value) -> Result<Value> {
        if let Some(mode) = params.get("onlineRankerRolloutMode").and_then(Value::as_str) {
            let parsed: RolloutMode = mode
                .parse()
                .map_err(|()| Error::invalid_params("invalid_rollout_mode"))?;
            self.store
                .set_setting(keys::ONLINE_RANKER_ROLLOUT_MODE, parsed.as_str())
                .await?;
        }
        for (param, key) in [
            ("learningEnabled", keys::LEARNING_ENABLED),
            ("behaviorStreamEnabled", keys::BEHAVIOR_STREAM_ENABLED),
            ("learningPauseOnUserInput", keys::LEARNING_PAUSE_ON_USER_INPUT),
        ] {
            if let Some(flag) = params.get(param).and_then(Value::as_bool) {
                self.store
                    .set_setting(key, if flag { "1" } else { "0" })
                    .await?;
            }
        }

        let settings = LearningSettings::load(&self.store).await?;
        Ok(json!({
            "updated": true,
            "learning": self.learning_health(&settings).await?,
        }))
    }
}

fn positive_example(event: &BehaviorEvent) -> TrainingExample {
    let query_len_norm = (event.query.len() as f64 / 64.0).min(1.0);
    TrainingExample {
        sample_id: uuid::Uuid::new_v4().to_string(),
        query: event.query.clone(),
        item_id: event.item_id.unwrap_or(0),
        features: json!({
            "lexical": 0.5,
            "semantic": 0.5,
            "positionDecay": 1.0,
            "attributionConfidence": event.attribution_confidence,
            "hasContext": f64::from(event.context_event_id.is_some()),
            "queryLenNorm": query_len_norm,
        }),
        label: 1,
        weight: 1.0,
        attribution_confidence: event.attribution_confidence,
        consumed: false,
        created_at: time::epoch_secs(),
    }
}
