//! Index health derivation. All O(1)-ish: two indexed counts and a pragma.

use betterspotlight_domain::constants::settings as keys;
use betterspotlight_domain::utils::time;
use betterspotlight_domain::value_objects::IndexHealth;
use betterspotlight_domain::{Error, Result};
use sqlx::Row;

use crate::store::SqliteStore;

impl SqliteStore {
    /// Derive index health.
    ///
    /// `items_without_content` subtracts the distinct content item count
    /// from the total item count instead of a NOT IN subquery; the FTS
    /// index size uses page stats instead of scanning chunk lengths.
    /// Expected-gap failures are excluded from `total_failures`.
    ///
    /// # Errors
    ///
    /// Returns a database error when any query fails.
    pub async fn get_health(&self) -> Result<IndexHealth> {
        let mut health = IndexHealth {
            total_indexed_items: self.count_items().await?,
            total_chunks: self.count_chunks().await?,
            ..Default::default()
        };

        let (critical, _expected) = self.failure_counts().await?;
        health.total_failures = critical;

        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM items) - (SELECT COUNT(DISTINCT item_id) FROM content) AS n",
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| Error::database_with_source("items_without_content failed", e))?;
        health.items_without_content = row.try_get("n").unwrap_or(0);

        let row = sqlx::query(
            "SELECT page_count * page_size AS bytes FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| Error::database_with_source("fts size probe failed", e))?;
        health.fts_index_size = row.try_get("bytes").unwrap_or(0);

        if let Some(last_index) = self.get_setting(keys::LAST_FULL_INDEX_AT).await? {
            health.last_index_time = last_index.parse().unwrap_or(0.0);
            if health.last_index_time > 0.0 {
                health.index_age = time::epoch_secs() - health.last_index_time;
            }
        }

        health.is_healthy = health.total_failures == 0;
        Ok(health)
    }
}
