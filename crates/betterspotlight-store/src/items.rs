//! Item CRUD.

use betterspotlight_domain::entities::{Item, ItemKind, NewItem};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::store::SqliteStore;

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let kind_str: String = row
        .try_get("kind")
        .map_err(|e| Error::database_with_source("item row missing kind", e))?;
    let kind = kind_str.parse::<ItemKind>().unwrap_or(ItemKind::Binary);
    Ok(Item {
        id: row.try_get("id").unwrap_or(0),
        path: row.try_get("path").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        extension: row.try_get("extension").ok(),
        kind,
        size: row.try_get("size").unwrap_or(0),
        created_at: row.try_get("created_at").unwrap_or(0.0),
        modified_at: row.try_get("modified_at").unwrap_or(0.0),
        indexed_at: row.try_get("indexed_at").unwrap_or(0.0),
        content_hash: row.try_get("content_hash").ok(),
        sensitivity: row
            .try_get("sensitivity")
            .unwrap_or_else(|_| "normal".to_owned()),
        is_pinned: row.try_get::<i64, _>("is_pinned").unwrap_or(0) != 0,
        parent_path: row.try_get("parent_path").ok(),
    })
}

const ITEM_COLUMNS: &str = "id, path, name, extension, kind, size, created_at, modified_at, \
     indexed_at, content_hash, sensitivity, is_pinned, parent_path";

impl SqliteStore {
    /// Upsert an item keyed on path and return its stable id.
    ///
    /// The id is obtained by re-reading the canonical row: last-insert-rowid
    /// can return a stale value when ON CONFLICT DO UPDATE fires inside a
    /// batch transaction with interleaved inserts on other rows.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails after the busy-retry
    /// budget, or when the row cannot be re-read.
    pub async fn upsert_item(&self, item: &NewItem) -> Result<i64> {
        let now = time::epoch_secs();
        self.with_busy_retry("upsert_item", || {
            sqlx::query(
                r"INSERT INTO items (path, name, extension, kind, size, created_at,
                           modified_at, indexed_at, content_hash, sensitivity, parent_path)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(path) DO UPDATE SET
            name = excluded.name,
            extension = excluded.extension,
            kind = excluded.kind,
            size = excluded.size,
            modified_at = excluded.modified_at,
            indexed_at = excluded.indexed_at,
            content_hash = excluded.content_hash,
            sensitivity = excluded.sensitivity,
            parent_path = excluded.parent_path",
            )
            .bind(&item.path)
            .bind(&item.name)
            .bind(item.extension.as_deref())
            .bind(item.kind.as_str())
            .bind(item.size)
            .bind(item.created_at)
            .bind(item.modified_at)
            .bind(now)
            .bind(item.content_hash.as_deref())
            .bind(&item.sensitivity)
            .bind(item.parent_path.as_deref())
            .execute(self.pool())
        })
        .await?;

        let row = self
            .get_item_by_path(&item.path)
            .await?
            .ok_or_else(|| Error::database("row not found after successful upsert"))?;
        Ok(row.id)
    }

    /// Fetch an item by canonical path.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_item_by_path(&self, path: &str) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE path = ?1"))
            .bind(path)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| Error::database_with_source("get_item_by_path failed", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Fetch an item by id.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_item_by_id(&self, id: i64) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| Error::database_with_source("get_item_by_id failed", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Delete an item by path. FTS rows go first (virtual tables do not
    /// cascade); the items delete then cascades to content, tags, failures,
    /// feedback and frequencies.
    ///
    /// # Errors
    ///
    /// Returns a database error when either delete fails.
    pub async fn delete_item_by_path(&self, path: &str) -> Result<()> {
        self.with_busy_retry("delete fts rows", || {
            sqlx::query("DELETE FROM search_index WHERE file_path = ?1")
                .bind(path)
                .execute(self.pool())
        })
        .await?;
        self.with_busy_retry("delete item", || {
            sqlx::query("DELETE FROM items WHERE path = ?1")
                .bind(path)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Update an item's content hash.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn update_content_hash(&self, item_id: i64, content_hash: &str) -> Result<()> {
        self.with_busy_retry("update_content_hash", || {
            sqlx::query("UPDATE items SET content_hash = ?1 WHERE id = ?2")
                .bind(content_hash)
                .bind(item_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Total item count.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn count_items(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM items")
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("count_items failed", e))?;
        Ok(row.try_get("n").unwrap_or(0))
    }

    /// Clear all indexed data. The FTS virtual table is cleared explicitly
    /// (no CASCADE); items cascade to everything else.
    ///
    /// # Errors
    ///
    /// Returns a database error when either delete fails.
    pub async fn delete_all(&self) -> Result<()> {
        self.with_busy_retry("clear search_index", || {
            sqlx::query("DELETE FROM search_index").execute(self.pool())
        })
        .await?;
        self.with_busy_retry("clear items", || {
            sqlx::query("DELETE FROM items").execute(self.pool())
        })
        .await?;
        tracing::info!("all indexed data cleared");
        Ok(())
    }
}
