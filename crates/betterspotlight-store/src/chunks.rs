//! Atomic chunk + inverted-index writes. THE critical path.

use betterspotlight_domain::entities::Chunk;
use betterspotlight_domain::{Error, Result};
use sqlx::Row;

use crate::store::SqliteStore;

impl SqliteStore {
    /// Replace the chunks of `item_id` atomically.
    ///
    /// Inside one savepoint: delete existing content rows, delete existing
    /// inverted-index rows, then insert every chunk row followed by its
    /// inverted-index row. Any failure rolls the savepoint back, so there
    /// is no state in which a chunk row exists without its index row or
    /// the reverse. A savepoint (not BEGIN) keeps this reentrant inside
    /// the writer's batch transaction.
    ///
    /// # Errors
    ///
    /// Returns a database error when any statement fails; the savepoint is
    /// rolled back first.
    pub async fn insert_chunks(
        &self,
        item_id: i64,
        file_name: &str,
        file_path: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| Error::database_with_source("failed to acquire connection", e))?;

        sqlx::query("SAVEPOINT insert_chunks")
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::database_with_source("failed to open savepoint", e))?;

        let outcome = async {
            sqlx::query("DELETE FROM content WHERE item_id = ?1")
                .bind(item_id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM search_index WHERE file_id = ?1")
                .bind(item_id)
                .execute(&mut *conn)
                .await?;

            for chunk in chunks {
                sqlx::query(
                    "INSERT INTO content (item_id, chunk_index, chunk_text, chunk_hash)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(item_id)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .bind(&chunk.chunk_id)
                .execute(&mut *conn)
                .await?;

                sqlx::query(
                    "INSERT INTO search_index (file_name, file_path, content, chunk_id, file_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(file_name)
                .bind(file_path)
                .bind(&chunk.text)
                .bind(&chunk.chunk_id)
                .bind(item_id)
                .execute(&mut *conn)
                .await?;
            }
            Ok::<(), sqlx::Error>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                sqlx::query("RELEASE SAVEPOINT insert_chunks")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| Error::database_with_source("failed to release savepoint", e))?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK TO SAVEPOINT insert_chunks")
                    .execute(&mut *conn)
                    .await;
                let _ = sqlx::query("RELEASE SAVEPOINT insert_chunks")
                    .execute(&mut *conn)
                    .await;
                Err(Error::database_with_source("insert_chunks failed", e))
            }
        }
    }

    /// Delete all chunks and inverted-index rows for an item.
    ///
    /// # Errors
    ///
    /// Returns a database error when either delete fails.
    pub async fn delete_chunks_for_item(&self, item_id: i64) -> Result<()> {
        self.with_busy_retry("delete fts rows for item", || {
            sqlx::query("DELETE FROM search_index WHERE file_id = ?1")
                .bind(item_id)
                .execute(self.pool())
        })
        .await?;
        self.with_busy_retry("delete content rows for item", || {
            sqlx::query("DELETE FROM content WHERE item_id = ?1")
                .bind(item_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// All chunk texts for an item, in chunk order.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn chunks_for_item(&self, item_id: i64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT chunk_index, chunk_text, chunk_hash FROM content
             WHERE item_id = ?1 ORDER BY chunk_index",
        )
        .bind(item_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("chunks_for_item failed", e))?;

        Ok(rows
            .iter()
            .map(|row| Chunk {
                chunk_id: row.try_get("chunk_hash").unwrap_or_default(),
                chunk_index: row.try_get("chunk_index").unwrap_or(0),
                text: row.try_get("chunk_text").unwrap_or_default(),
            })
            .collect())
    }

    /// Total chunk count.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn count_chunks(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM content")
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("count_chunks failed", e))?;
        Ok(row.try_get("n").unwrap_or(0))
    }

    /// Items joined with their concatenated chunk text (capped per item),
    /// for embedding rebuilds.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn items_with_chunk_text(&self, max_chars: i64) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            "SELECT item_id, substr(group_concat(chunk_text, ' '), 1, ?1) AS body
             FROM (SELECT item_id, chunk_text FROM content ORDER BY item_id, chunk_index)
             GROUP BY item_id",
        )
        .bind(max_chars)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::database_with_source("items_with_chunk_text failed", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.try_get("item_id").unwrap_or(0),
                    row.try_get("body").unwrap_or_default(),
                )
            })
            .collect())
    }

    /// Which of `item_ids` have at least one chunk row.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn items_with_content(
        &self,
        item_ids: &[i64],
    ) -> Result<std::collections::HashSet<i64>> {
        if item_ids.is_empty() {
            return Ok(std::collections::HashSet::new());
        }
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT DISTINCT item_id FROM content WHERE item_id IN (");
        let mut separated = builder.separated(", ");
        for id in item_ids {
            separated.push_bind(*id);
        }
        builder.push(")");
        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::database_with_source("items_with_content failed", e))?;
        Ok(rows
            .iter()
            .map(|row| row.try_get("item_id").unwrap_or(0))
            .collect())
    }

    /// Count of inverted-index rows for one item (invariant checks).
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn count_fts_rows_for_item(&self, item_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM search_index WHERE file_id = ?1")
            .bind(item_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("count_fts_rows_for_item failed", e))?;
        Ok(row.try_get("n").unwrap_or(0))
    }
}
