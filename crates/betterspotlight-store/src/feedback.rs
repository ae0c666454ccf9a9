//! Feedback log, frequency aggregation and interaction tracking.

use std::collections::HashMap;

use betterspotlight_domain::entities::{FeedbackAction, FrequencyRow};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::store::SqliteStore;

impl SqliteStore {
    /// Append a feedback row.
    ///
    /// # Errors
    ///
    /// Returns a database error when the insert fails.
    pub async fn record_feedback(
        &self,
        item_id: i64,
        action: FeedbackAction,
        query: &str,
        result_position: i64,
    ) -> Result<()> {
        let now = time::epoch_secs();
        self.with_busy_retry("record_feedback", || {
            sqlx::query(
                "INSERT INTO feedback (item_id, action, query, result_position, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(item_id)
            .bind(action.as_str())
            .bind(query)
            .bind(result_position)
            .bind(now)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Bump an item's open counters directly.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn increment_frequency(&self, item_id: i64) -> Result<()> {
        let now = time::epoch_secs();
        self.with_busy_retry("increment_frequency", || {
            sqlx::query(
                r"INSERT INTO frequencies (item_id, open_count, last_opened_at, total_interactions)
        VALUES (?1, 1, ?2, 1)
        ON CONFLICT(item_id) DO UPDATE SET
            open_count = open_count + 1,
            last_opened_at = excluded.last_opened_at,
            total_interactions = total_interactions + 1",
            )
            .bind(item_id)
            .bind(now)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Frequency counters for one item.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_frequency(&self, item_id: i64) -> Result<Option<FrequencyRow>> {
        let row = sqlx::query(
            "SELECT open_count, last_opened_at, total_interactions
             FROM frequencies WHERE item_id = ?1",
        )
        .bind(item_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| Error::database_with_source("get_frequency failed", e))?;

        Ok(row.map(|r| FrequencyRow {
            open_count: r.try_get("open_count").unwrap_or(0),
            last_opened_at: r.try_get("last_opened_at").ok(),
            total_interactions: r.try_get("total_interactions").unwrap_or(0),
        }))
    }

    /// Frequency counters for a batch of items in one round trip.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_frequencies_batch(
        &self,
        item_ids: &[i64],
    ) -> Result<HashMap<i64, FrequencyRow>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT item_id, open_count, last_opened_at, total_interactions
             FROM frequencies WHERE item_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in item_ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::database_with_source("get_frequencies_batch failed", e))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            out.insert(
                row.try_get("item_id").unwrap_or(0),
                FrequencyRow {
                    open_count: row.try_get("open_count").unwrap_or(0),
                    last_opened_at: row.try_get("last_opened_at").ok(),
                    total_interactions: row.try_get("total_interactions").unwrap_or(0),
                },
            );
        }
        Ok(out)
    }

    /// Fold `opened` feedback into the frequencies relation. Idempotent
    /// over an unchanged feedback table because consumed rows are deleted
    /// in the same statement batch.
    ///
    /// # Errors
    ///
    /// Returns a database error when the aggregation fails.
    pub async fn aggregate_feedback(&self) -> Result<()> {
        self.with_busy_retry("aggregate_feedback", || {
            sqlx::query(
                r"INSERT OR REPLACE INTO frequencies (item_id, open_count, last_opened_at, total_interactions)
        SELECT f.item_id,
               COALESCE(freq.open_count, 0) + COUNT(*),
               MAX(f.timestamp),
               COALESCE(freq.total_interactions, 0) + COUNT(*)
        FROM feedback f
        LEFT JOIN frequencies freq ON freq.item_id = f.item_id
        WHERE f.action = 'opened' AND f.id > COALESCE((
            SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'lastAggregatedFeedbackId'), 0)
        GROUP BY f.item_id",
            )
            .execute(self.pool())
        })
        .await?;

        // Advance the high-water mark so replaying the aggregation over an
        // unchanged feedback table is a no-op.
        self.with_busy_retry("advance aggregation watermark", || {
            sqlx::query(
                r"INSERT INTO settings (key, value)
        VALUES ('lastAggregatedFeedbackId', COALESCE((SELECT MAX(id) FROM feedback), 0))
        ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Delete feedback older than the retention window.
    ///
    /// # Errors
    ///
    /// Returns a database error when the delete fails.
    pub async fn cleanup_old_feedback(&self, retention_days: i64) -> Result<u64> {
        let cutoff = time::epoch_secs() - (retention_days as f64) * 86_400.0;
        let result = self
            .with_busy_retry("cleanup_old_feedback", || {
                sqlx::query("DELETE FROM feedback WHERE timestamp < ?1")
                    .bind(cutoff)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.rows_affected())
    }

    /// Record a search interaction (richer than feedback; feeds the
    /// personalization layer).
    ///
    /// # Errors
    ///
    /// Returns a database error when the insert fails.
    pub async fn record_interaction(
        &self,
        query: &str,
        item_id: i64,
        path: &str,
        match_type: &str,
        result_position: i64,
        app_context: Option<&str>,
    ) -> Result<()> {
        let now = time::epoch_secs();
        self.with_busy_retry("record_interaction", || {
            sqlx::query(
                "INSERT INTO interactions (query, query_normalized, item_id, path, match_type,
                                           result_position, app_context, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(query)
            .bind(query.trim().to_lowercase())
            .bind(item_id)
            .bind(path)
            .bind(match_type)
            .bind(result_position)
            .bind(app_context)
            .bind(now)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Delete interactions older than the retention window.
    ///
    /// # Errors
    ///
    /// Returns a database error when the delete fails.
    pub async fn cleanup_old_interactions(&self, retention_days: i64) -> Result<u64> {
        let cutoff = time::epoch_secs() - (retention_days as f64) * 86_400.0;
        let result = self
            .with_busy_retry("cleanup_old_interactions", || {
                sqlx::query("DELETE FROM interactions WHERE timestamp < ?1")
                    .bind(cutoff)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.rows_affected())
    }
}
