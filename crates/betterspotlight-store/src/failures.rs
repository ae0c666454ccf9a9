//! Failure records with severity-aware aggregation.

use betterspotlight_domain::entities::{FailureRecord, FailureSeverity};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use sqlx::Row;

use crate::store::SqliteStore;

impl SqliteStore {
    /// Record (or bump) a failure for `(item_id, stage)`.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn record_failure(&self, item_id: i64, stage: &str, message: &str) -> Result<()> {
        let now = time::epoch_secs();
        self.with_busy_retry("record_failure", || {
            sqlx::query(
                r"INSERT INTO failures (item_id, stage, error_message, failure_count, first_failed_at, last_failed_at)
        VALUES (?1, ?2, ?3, 1, ?4, ?4)
        ON CONFLICT(item_id, stage) DO UPDATE SET
            failure_count = failure_count + 1,
            last_failed_at = excluded.last_failed_at,
            error_message = excluded.error_message",
            )
            .bind(item_id)
            .bind(stage)
            .bind(message)
            .bind(now)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Clear all failures for an item (called after a successful re-index).
    ///
    /// # Errors
    ///
    /// Returns a database error when the delete fails.
    pub async fn clear_failures(&self, item_id: i64) -> Result<()> {
        self.with_busy_retry("clear_failures", || {
            sqlx::query("DELETE FROM failures WHERE item_id = ?1")
                .bind(item_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Failure counts split by severity: `(critical, expected_gap)`.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn failure_counts(&self) -> Result<(i64, i64)> {
        let rows = sqlx::query("SELECT stage, error_message FROM failures")
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::database_with_source("failure_counts failed", e))?;

        let mut critical = 0;
        let mut expected = 0;
        for row in &rows {
            let stage: String = row.try_get("stage").unwrap_or_default();
            let message: String = row.try_get("error_message").unwrap_or_default();
            match FailureSeverity::classify(&stage, &message) {
                FailureSeverity::Critical => critical += 1,
                FailureSeverity::ExpectedGap => expected += 1,
            }
        }
        Ok((critical, expected))
    }

    /// Extraction failure messages for a batch of items, for availability
    /// annotation.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn extraction_failures_for_items(
        &self,
        item_ids: &[i64],
    ) -> Result<std::collections::HashMap<i64, String>> {
        if item_ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "SELECT item_id, error_message FROM failures WHERE stage = 'extraction' AND item_id IN (",
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
            .map_err(|e| Error::database_with_source("extraction_failures_for_items failed", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.try_get("item_id").unwrap_or(0),
                    row.try_get("error_message").unwrap_or_default(),
                )
            })
            .collect())
    }

    /// Paginated failure rows joined with item paths, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn failures_page(&self, limit: i64, offset: i64) -> Result<Vec<FailureRecord>> {
        let rows = sqlx::query(
            "SELECT f.item_id, i.path, f.stage, f.error_message, f.failure_count,
                    f.first_failed_at, f.last_failed_at
             FROM failures f
             LEFT JOIN items i ON i.id = f.item_id
             ORDER BY f.last_failed_at DESC
             LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("failures_page failed", e))?;

        Ok(rows
            .iter()
            .map(|row| FailureRecord {
                item_id: row.try_get("item_id").unwrap_or(0),
                item_path: row.try_get("path").ok(),
                stage: row.try_get("stage").unwrap_or_default(),
                message: row.try_get("error_message").unwrap_or_default(),
                failure_count: row.try_get("failure_count").unwrap_or(0),
                first_failed_at: row.try_get("first_failed_at").unwrap_or(0.0),
                last_failed_at: row.try_get("last_failed_at").unwrap_or(0.0),
            })
            .collect())
    }
}
