//! Learning-layer persistence: behavior events, training examples, the
//! replay reservoir and model state.

use betterspotlight_domain::constants::learning::REPLAY_RESERVOIR_CAPACITY;
use betterspotlight_domain::entities::{
    BehaviorEvent, LearningBackend, LearningModelState, TrainingExample,
};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use rand::Rng;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::store::SqliteStore;

impl SqliteStore {
    /// Insert a behavior event. Returns false when `event_id` was already
    /// recorded (idempotent replay).
    ///
    /// # Errors
    ///
    /// Returns a database error when the insert fails.
    pub async fn insert_behavior_event(
        &self,
        event: &BehaviorEvent,
        attributed_positive: bool,
    ) -> Result<bool> {
        let result = self
            .with_busy_retry("insert_behavior_event", || {
                sqlx::query(
                    r"INSERT OR IGNORE INTO behavior_events_v1
        (event_id, event_type, source, timestamp, item_id, item_path, query,
         app_bundle_id, context_event_id, activity_digest, attribution_confidence,
         attributed_positive)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )
                .bind(&event.event_id)
                .bind(event.event_type.as_str())
                .bind(&event.source)
                .bind(event.timestamp)
                .bind(event.item_id)
                .bind(event.item_path.as_deref())
                .bind(&event.query)
                .bind(event.app_bundle_id.as_deref())
                .bind(event.context_event_id.as_deref())
                .bind(event.activity_digest.as_deref())
                .bind(event.attribution_confidence)
                .bind(i64::from(attributed_positive))
                .execute(self.pool())
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Total recorded behavior events.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn count_behavior_events(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM behavior_events_v1")
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("count_behavior_events failed", e))?;
        Ok(row.try_get("n").unwrap_or(0))
    }

    /// Behavior-coverage counters for learning health:
    /// `(events, attributed_positive, with_context_digest)`.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn behavior_coverage(&self) -> Result<(i64, i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS events,
                    SUM(attributed_positive) AS positives,
                    SUM(CASE WHEN context_event_id IS NOT NULL THEN 1 ELSE 0 END) AS with_context
             FROM behavior_events_v1",
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| Error::database_with_source("behavior_coverage failed", e))?;
        Ok((
            row.try_get("events").unwrap_or(0),
            row.try_get::<Option<i64>, _>("positives").ok().flatten().unwrap_or(0),
            row.try_get::<Option<i64>, _>("with_context").ok().flatten().unwrap_or(0),
        ))
    }

    /// Delete behavior events older than the retention window.
    ///
    /// # Errors
    ///
    /// Returns a database error when the delete fails.
    pub async fn cleanup_old_behavior_events(&self, retention_days: i64) -> Result<u64> {
        let cutoff = time::epoch_secs() - (retention_days as f64) * 86_400.0;
        let result = self
            .with_busy_retry("cleanup_old_behavior_events", || {
                sqlx::query("DELETE FROM behavior_events_v1 WHERE timestamp < ?1")
                    .bind(cutoff)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.rows_affected())
    }

    /// Insert a training example.
    ///
    /// # Errors
    ///
    /// Returns a database error when the insert fails.
    pub async fn insert_training_example(&self, example: &TrainingExample) -> Result<()> {
        let features = serde_json::to_string(&example.features)?;
        self.with_busy_retry("insert_training_example", || {
            sqlx::query(
                r"INSERT OR REPLACE INTO training_examples_v1
        (sample_id, query, item_id, features, label, weight, attribution_confidence,
         consumed, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&example.sample_id)
            .bind(&example.query)
            .bind(example.item_id)
            .bind(&features)
            .bind(example.label)
            .bind(example.weight)
            .bind(example.attribution_confidence)
            .bind(i64::from(example.consumed))
            .bind(example.created_at)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Count of fresh (unconsumed) training examples.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn pending_example_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM training_examples_v1 WHERE consumed = 0")
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("pending_example_count failed", e))?;
        Ok(row.try_get("n").unwrap_or(0))
    }

    /// Fetch up to `limit` fresh examples, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn fetch_training_batch(&self, limit: i64) -> Result<Vec<TrainingExample>> {
        let rows = sqlx::query(
            "SELECT sample_id, query, item_id, features, label, weight,
                    attribution_confidence, consumed, created_at
             FROM training_examples_v1 WHERE consumed = 0
             ORDER BY created_at LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("fetch_training_batch failed", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let features_text: String = row.try_get("features").unwrap_or_default();
                TrainingExample {
                    sample_id: row.try_get("sample_id").unwrap_or_default(),
                    query: row.try_get("query").unwrap_or_default(),
                    item_id: row.try_get("item_id").unwrap_or(0),
                    features: serde_json::from_str(&features_text)
                        .unwrap_or(serde_json::Value::Null),
                    label: row.try_get::<i64, _>("label").unwrap_or(0) as i32,
                    weight: row.try_get("weight").unwrap_or(1.0),
                    attribution_confidence: row.try_get("attribution_confidence").unwrap_or(0.0),
                    consumed: row.try_get::<i64, _>("consumed").unwrap_or(0) != 0,
                    created_at: row.try_get("created_at").unwrap_or(0.0),
                }
            })
            .collect())
    }

    /// Mark a batch of examples consumed.
    ///
    /// # Errors
    ///
    /// Returns a database error when the update fails.
    pub async fn mark_examples_consumed(&self, sample_ids: &[String]) -> Result<()> {
        if sample_ids.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("UPDATE training_examples_v1 SET consumed = 1 WHERE sample_id IN (");
        let mut separated = builder.separated(", ");
        for id in sample_ids {
            separated.push_bind(id);
        }
        builder.push(")");
        builder
            .build()
            .execute(self.pool())
            .await
            .map_err(|e| Error::database_with_source("mark_examples_consumed failed", e))?;
        Ok(())
    }

    /// Reservoir-sample a negative candidate `(query, item_id, features)`.
    /// Classic reservoir: below capacity always insert; above it, replace a
    /// random slot with probability capacity/seen so older queries decay.
    ///
    /// # Errors
    ///
    /// Returns a database error when a statement fails.
    pub async fn reservoir_offer(
        &self,
        query: &str,
        item_id: i64,
        features: &serde_json::Value,
    ) -> Result<()> {
        let seen = self.setting_i64("replayReservoirSeen", 0).await? + 1;
        self.set_setting("replayReservoirSeen", &seen.to_string())
            .await?;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM replay_reservoir_v1")
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("reservoir count failed", e))?;
        let count: i64 = row.try_get("n").unwrap_or(0);
        let features_text = serde_json::to_string(features)?;
        let now = time::epoch_secs();

        if count < REPLAY_RESERVOIR_CAPACITY as i64 {
            self.with_busy_retry("reservoir insert", || {
                sqlx::query(
                    "INSERT INTO replay_reservoir_v1 (query, item_id, features, inserted_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(query)
                .bind(item_id)
                .bind(&features_text)
                .bind(now)
                .execute(self.pool())
            })
            .await?;
            return Ok(());
        }

        let slot = rand::rng().random_range(0..seen);
        if slot >= REPLAY_RESERVOIR_CAPACITY as i64 {
            return Ok(());
        }
        self.with_busy_retry("reservoir replace", || {
            sqlx::query(
                r"UPDATE replay_reservoir_v1
        SET query = ?1, item_id = ?2, features = ?3, inserted_at = ?4
        WHERE id = (SELECT id FROM replay_reservoir_v1 LIMIT 1 OFFSET ?5)",
            )
            .bind(query)
            .bind(item_id)
            .bind(&features_text)
            .bind(now)
            .bind(slot)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Random negatives from the reservoir.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn reservoir_sample(
        &self,
        limit: i64,
    ) -> Result<Vec<(String, i64, serde_json::Value)>> {
        let rows = sqlx::query(
            "SELECT query, item_id, features FROM replay_reservoir_v1
             ORDER BY RANDOM() LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("reservoir_sample failed", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let features_text: String = row.try_get("features").unwrap_or_default();
                (
                    row.try_get("query").unwrap_or_default(),
                    row.try_get("item_id").unwrap_or(0),
                    serde_json::from_str(&features_text).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect())
    }

    /// Learning model state for `name`, or fresh defaults.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_model_state(&self, name: &str) -> Result<LearningModelState> {
        let row = sqlx::query(
            "SELECT name, active_version, rollback_version, active_backend,
                    last_cycle_status, last_cycle_reason, cycles_run, promotions, rejections
             FROM learning_model_state_v1 WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| Error::database_with_source("get_model_state failed", e))?;

        Ok(row.map_or_else(
            || LearningModelState::fresh(name),
            |r| {
                let backend: String = r.try_get("active_backend").unwrap_or_default();
                LearningModelState {
                    name: r.try_get("name").unwrap_or_default(),
                    active_version: r.try_get("active_version").unwrap_or(0),
                    rollback_version: r.try_get("rollback_version").unwrap_or(0),
                    active_backend: backend.parse().unwrap_or(LearningBackend::None),
                    last_cycle_status: r.try_get("last_cycle_status").unwrap_or_default(),
                    last_cycle_reason: r.try_get("last_cycle_reason").unwrap_or_default(),
                    cycles_run: r.try_get("cycles_run").unwrap_or(0),
                    promotions: r.try_get("promotions").unwrap_or(0),
                    rejections: r.try_get("rejections").unwrap_or(0),
                }
            },
        ))
    }

    /// Persist learning model state.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn put_model_state(&self, state: &LearningModelState) -> Result<()> {
        self.with_busy_retry("put_model_state", || {
            sqlx::query(
                r"INSERT INTO learning_model_state_v1
        (name, active_version, rollback_version, active_backend, last_cycle_status,
         last_cycle_reason, cycles_run, promotions, rejections)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(name) DO UPDATE SET
            active_version = excluded.active_version,
            rollback_version = excluded.rollback_version,
            active_backend = excluded.active_backend,
            last_cycle_status = excluded.last_cycle_status,
            last_cycle_reason = excluded.last_cycle_reason,
            cycles_run = excluded.cycles_run,
            promotions = excluded.promotions,
            rejections = excluded.rejections",
            )
            .bind(&state.name)
            .bind(state.active_version)
            .bind(state.rollback_version)
            .bind(state.active_backend.as_str())
            .bind(&state.last_cycle_status)
            .bind(&state.last_cycle_reason)
            .bind(state.cycles_run)
            .bind(state.promotions)
            .bind(state.rejections)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }
}
