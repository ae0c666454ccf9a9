//! Batch writer: turns scheduled paths into atomic store writes. An item
//! is either fully indexed, recorded in Failures, or deleted when its path
//! vanished; never silently dropped.

use std::path::Path;
use std::sync::Arc;

use betterspotlight_domain::constants::failures::STAGE_EXTRACTION;
use betterspotlight_domain::entities::NewItem;
use betterspotlight_domain::ports::{ContentExtractor, ExtractionOutcome};
use betterspotlight_domain::utils::id;
use betterspotlight_domain::Result;
use betterspotlight_store::SqliteStore;
use tracing::{debug, warn};

use crate::chunker;
use crate::scheduler::ScheduledItem;
use crate::telemetry::PipelineTelemetry;

/// Writer configuration, read from the settings relation at startup.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    pub chunk_size_bytes: usize,
    pub max_file_size: i64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 4_096,
            max_file_size: 104_857_600,
        }
    }
}

/// Outcome of one item write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Indexed,
    Unchanged,
    Deleted,
    ExpectedGap,
    Failed,
}

/// The indexer's writer side.
pub struct IndexWriter {
    store: SqliteStore,
    extractor: Arc<dyn ContentExtractor>,
    telemetry: Arc<PipelineTelemetry>,
    config: WriterConfig,
}

impl IndexWriter {
    #[must_use]
    pub fn new(
        store: SqliteStore,
        extractor: Arc<dyn ContentExtractor>,
        telemetry: Arc<PipelineTelemetry>,
        config: WriterConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            telemetry,
            config,
        }
    }

    /// Write one batch. Returns `(written, failed)` counts.
    pub async fn write_batch(&self, batch: &[ScheduledItem]) -> (u64, u64) {
        let mut written = 0;
        let mut failed = 0;
        for scheduled in batch {
            self.telemetry.record_writer_dispatch(scheduled.lane);
            match self.process_one(&scheduled.item.path).await {
                Ok(WriteOutcome::Indexed) => written += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %scheduled.item.path, error = %e, "failed to index item");
                    failed += 1;
                }
            }
        }
        self.telemetry.record_written(written);
        self.telemetry.record_failed(failed);
        (written, failed)
    }

    /// Process a single path end to end.
    ///
    /// # Errors
    ///
    /// Returns a store error when a write fails after retries; the caller
    /// records the failure.
    pub async fn process_one(&self, path: &str) -> Result<WriteOutcome> {
        let fs_path = Path::new(path);
        let Ok(metadata) = std::fs::metadata(fs_path) else {
            // Path vanished: drop the item and its derived rows.
            self.store.delete_item_by_path(path).await?;
            debug!(path, "path vanished, item removed");
            return Ok(WriteOutcome::Deleted);
        };

        let created_at = file_time(metadata.created().ok());
        let modified_at = file_time(metadata.modified().ok());
        let mut item = NewItem::from_path(path, metadata.len() as i64, created_at, modified_at);

        let outcome = self
            .extractor
            .extract(fs_path, self.config.max_file_size)
            .await?;
        match outcome {
            ExtractionOutcome::ExpectedGap(message) => {
                let item_id = self.store.upsert_item(&item).await?;
                self.store
                    .record_failure(item_id, STAGE_EXTRACTION, &message)
                    .await?;
                Ok(WriteOutcome::ExpectedGap)
            }
            ExtractionOutcome::Text(text) => {
                let content_hash = id::content_hash(&text);
                if let Some(existing) = self.store.get_item_by_path(path).await? {
                    if existing.content_hash.as_deref() == Some(content_hash.as_str())
                        && existing.modified_at >= modified_at
                    {
                        return Ok(WriteOutcome::Unchanged);
                    }
                }

                item.content_hash = Some(content_hash);
                let item_id = self.store.upsert_item(&item).await?;
                let chunks = chunker::chunk_text(path, &text, self.config.chunk_size_bytes);
                self.store
                    .insert_chunks(item_id, &item.name, path, &chunks)
                    .await?;
                self.store.clear_failures(item_id).await?;
                Ok(WriteOutcome::Indexed)
            }
        }
    }
}

fn file_time(time: Option<std::time::SystemTime>) -> f64 {
    time.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64())
}
