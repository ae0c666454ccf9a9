//! Vector map and generation state.

use betterspotlight_domain::entities::{GenerationState, VectorMapEntry};
use betterspotlight_domain::{Error, Result};
use sqlx::Row;

use crate::store::SqliteStore;

impl SqliteStore {
    /// Upsert the dense-index label mapping for an item.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn upsert_vector_map(&self, entry: &VectorMapEntry) -> Result<()> {
        self.with_busy_retry("upsert_vector_map", || {
            sqlx::query(
                r"INSERT INTO vector_map (item_id, dense_label, model_version, generation, embedded_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(item_id) DO UPDATE SET
            dense_label = excluded.dense_label,
            model_version = excluded.model_version,
            generation = excluded.generation,
            embedded_at = excluded.embedded_at",
            )
            .bind(entry.item_id)
            .bind(entry.dense_label)
            .bind(&entry.model_version)
            .bind(entry.generation)
            .bind(entry.embedded_at)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Remove an item's dense-index mapping.
    ///
    /// # Errors
    ///
    /// Returns a database error when the delete fails.
    pub async fn delete_vector_map(&self, item_id: i64) -> Result<()> {
        self.with_busy_retry("delete_vector_map", || {
            sqlx::query("DELETE FROM vector_map WHERE item_id = ?1")
                .bind(item_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Resolve item ids for dense labels of one generation.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn items_for_labels(
        &self,
        labels: &[i64],
        generation: i64,
    ) -> Result<Vec<(i64, i64)>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "SELECT item_id, dense_label FROM vector_map WHERE generation = ",
        );
        builder.push_bind(generation);
        builder.push(" AND dense_label IN (");
        let mut separated = builder.separated(", ");
        for label in labels {
            separated.push_bind(*label);
        }
        builder.push(")");

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::database_with_source("items_for_labels failed", e))?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.try_get("item_id").unwrap_or(0),
                    row.try_get("dense_label").unwrap_or(0),
                )
            })
            .collect())
    }

    /// Current generation state (active + rollback versions).
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_generation_state(&self) -> Result<GenerationState> {
        let row = sqlx::query(
            "SELECT active_version, rollback_version FROM vector_generation_state WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(|e| Error::database_with_source("get_generation_state failed", e))?;
        Ok(row.map_or_else(GenerationState::default, |r| GenerationState {
            active_version: r.try_get("active_version").unwrap_or(0),
            rollback_version: r.try_get("rollback_version").unwrap_or(0),
        }))
    }

    /// Atomically promote a shadow generation: the previous active version
    /// becomes the rollback version.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn swap_generation(&self, new_active: i64) -> Result<GenerationState> {
        let current = self.get_generation_state().await?;
        self.with_busy_retry("swap_generation", || {
            sqlx::query(
                r"INSERT INTO vector_generation_state (id, active_version, rollback_version)
        VALUES (1, ?1, ?2)
        ON CONFLICT(id) DO UPDATE SET
            active_version = excluded.active_version,
            rollback_version = excluded.rollback_version",
            )
            .bind(new_active)
            .bind(current.active_version)
            .execute(self.pool())
        })
        .await?;
        Ok(GenerationState {
            active_version: new_active,
            rollback_version: current.active_version,
        })
    }
}
