//! Store handle: open, pragmas, schema application, migrations and the
//! busy-retry loop shared by every write path.

use std::path::Path;
use std::time::Duration;

use betterspotlight_domain::constants::settings as keys;
use betterspotlight_domain::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::schema;

/// Maximum application-level attempts for a busy write.
pub(crate) const BUSY_RETRY_ATTEMPTS: u32 = 5;

/// Base sleep between busy retries; attempt N sleeps `N * 50ms`.
pub(crate) const BUSY_RETRY_STEP_MS: u64 = 50;

/// Handle to the store. Two states only: open (all migrations applied) and
/// dropped. A failed open never yields a handle.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create/migrate if needed) the store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns a database error when the file cannot be opened, the schema
    /// cannot be created, or a migration fails.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io("failed to create store directory", e))?;
        }

        // busy_timeout is set high (30 s) so a second process (e.g. the
        // query service) waits out any long batch transaction held by the
        // indexer.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .pragma("wal_autocheckpoint", "10000")
            .pragma("cache_size", "-65536")
            .pragma("journal_size_limit", "33554432");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| Error::database_with_source("failed to open database", e))?;

        let store = Self { pool };
        store.init_schema().await?;
        store.apply_migrations().await?;
        info!(path = %path.display(), "database opened");
        Ok(store)
    }

    /// Schema existence probe + creation. When a second process opens the
    /// database while the indexer holds a batch transaction, skipping the
    /// write-heavy schema creation avoids contending for the WAL write
    /// lock entirely.
    async fn init_schema(&self) -> Result<()> {
        let row = sqlx::query(
            "SELECT count(*) AS n FROM sqlite_master WHERE type='table' AND name='items'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("schema probe failed", e))?;
        let exists: i64 = row.try_get("n").unwrap_or(0);
        if exists > 0 {
            return Ok(());
        }

        for (index, statement) in schema::SCHEMA_STATEMENTS.iter().enumerate() {
            sqlx::query(statement).execute(&self.pool).await.map_err(|e| {
                Error::database_with_source(
                    format!(
                        "failed to apply DDL statement {}/{}",
                        index + 1,
                        schema::SCHEMA_STATEMENTS.len()
                    ),
                    e,
                )
            })?;
        }

        if let Err(e) = sqlx::query(schema::FTS_WEIGHT_CONFIG)
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "failed to set BM25 weights; falling back to defaults");
        }

        for (key, value) in schema::DEFAULT_SETTINGS {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::database_with_source("failed to seed default settings", e))?;
        }

        Ok(())
    }

    /// Run pending migrations. The schema is never altered outside this
    /// step; a successful open implies a current schema.
    async fn apply_migrations(&self) -> Result<()> {
        let version = self
            .get_setting(keys::SCHEMA_VERSION)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if version >= schema::CURRENT_SCHEMA_VERSION {
            return Ok(());
        }
        // v1 -> v2: the learning tables were added with IF NOT EXISTS in
        // the base DDL, so upgrading only needs the version stamp.
        self.set_setting(
            keys::SCHEMA_VERSION,
            &schema::CURRENT_SCHEMA_VERSION.to_string(),
        )
        .await?;
        info!(
            from = version,
            to = schema::CURRENT_SCHEMA_VERSION,
            "schema migrated"
        );
        Ok(())
    }

    /// Pool accessor for module-internal queries.
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool. The handle is unusable afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// True for SQLITE_BUSY / SQLITE_LOCKED shaped errors.
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            matches!(code.as_deref(), Some("5" | "6" | "517" | "262"))
                || db.message().contains("database is locked")
                || db.message().contains("database table is locked")
        }
        _ => false,
    }
}

impl SqliteStore {
    /// Run `op` with the busy-retry loop: up to 5 attempts with linearly
    /// increasing sleep (50 ms per attempt). The native busy handler is not
    /// invoked in all contention paths (WAL snapshot/writer conflicts), so
    /// this retries at the application level even after the 30 s timeout.
    pub(crate) async fn with_busy_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    attempt += 1;
                    if attempt >= BUSY_RETRY_ATTEMPTS {
                        return Err(Error::DatabaseBusy {
                            message: what.to_owned(),
                            attempts: attempt,
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(
                        BUSY_RETRY_STEP_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(e) => return Err(Error::database_with_source(what.to_owned(), e)),
            }
        }
    }
}
