//! Settings relation: string key/value plus typed accessors.

use betterspotlight_domain::{Error, Result};
use sqlx::Row;

use crate::store::SqliteStore;

impl SqliteStore {
    /// Read a setting value.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| Error::database_with_source("get_setting failed", e))?;
        Ok(row.map(|r| r.try_get("value").unwrap_or_default()))
    }

    /// Write a setting value.
    ///
    /// # Errors
    ///
    /// Returns a database error when the write fails.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_busy_retry("set_setting", || {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Boolean setting: `1`/`true` are true, everything else false.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn setting_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .get_setting(key)
            .await?
            .map_or(default, |v| v == "1" || v.eq_ignore_ascii_case("true")))
    }

    /// Integer setting with a default for missing/unparseable values.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn setting_i64(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    /// Float setting with a default for missing/unparseable values.
    ///
    /// # Errors
    ///
    /// Returns a database error when the query fails.
    pub async fn setting_f64(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }
}
