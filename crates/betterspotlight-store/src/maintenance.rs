//! Maintenance operations: FTS optimize, vacuum, integrity checks and WAL
//! checkpointing.

use betterspotlight_domain::{Error, Result};
use sqlx::Row;

use crate::store::SqliteStore;

impl SqliteStore {
    /// Merge FTS5 b-tree segments.
    ///
    /// # Errors
    ///
    /// Returns a database error when the statement fails.
    pub async fn optimize_fts(&self) -> Result<()> {
        self.with_busy_retry("optimize_fts", || {
            sqlx::query("INSERT INTO search_index(search_index) VALUES('optimize')")
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Rebuild the database file.
    ///
    /// # Errors
    ///
    /// Returns a database error when the statement fails.
    pub async fn vacuum(&self) -> Result<()> {
        self.with_busy_retry("vacuum", || sqlx::query("VACUUM").execute(self.pool()))
            .await?;
        Ok(())
    }

    /// Whole-database integrity check.
    ///
    /// # Errors
    ///
    /// Returns a database error when the pragma fails.
    pub async fn integrity_check(&self) -> Result<bool> {
        let row = sqlx::query("PRAGMA integrity_check")
            .fetch_one(self.pool())
            .await
            .map_err(|e| Error::database_with_source("integrity_check failed", e))?;
        let result: String = row.try_get(0).unwrap_or_default();
        Ok(result == "ok")
    }

    /// FTS5 internal consistency check. A failure means the inverted index
    /// is corrupted and callers should escalate to an administrative
    /// rebuild.
    ///
    /// # Errors
    ///
    /// Returns `CorruptedIndex` when the check fails.
    pub async fn fts_integrity_check(&self) -> Result<()> {
        sqlx::query("INSERT INTO search_index(search_index, rank) VALUES('integrity-check', 1)")
            .execute(self.pool())
            .await
            .map_err(|e| Error::CorruptedIndex {
                message: format!("FTS integrity check failed: {e}"),
            })?;
        Ok(())
    }

    /// Truncate the WAL into the main database file.
    ///
    /// # Errors
    ///
    /// Returns a database error when the pragma fails.
    pub async fn wal_checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(self.pool())
            .await
            .map_err(|e| Error::database_with_source("wal_checkpoint failed", e))?;
        Ok(())
    }
}
