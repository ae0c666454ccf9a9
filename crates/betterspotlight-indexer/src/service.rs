//! Indexer service: IPC surface, writer loop and root management.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use betterspotlight_domain::constants::settings as keys;
use betterspotlight_domain::{Error, Result};
use betterspotlight_ipc::service::MethodHandler;
use betterspotlight_store::SqliteStore;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::scheduler::{PipelineLane, PipelineScheduler, SchedulerConfig};
use crate::telemetry::PipelineTelemetry;
use crate::watcher::{scan_root, RootWatcher};
use crate::writer::{IndexWriter, WriterConfig};

/// Items pulled per writer batch after the blocking head item.
const WRITER_BATCH_MAX: usize = 16;

/// The indexer service state shared between the IPC handler and the
/// writer thread.
pub struct IndexerService {
    store: SqliteStore,
    scheduler: Arc<PipelineScheduler>,
    telemetry: Arc<PipelineTelemetry>,
    writer: Arc<IndexWriter>,
    stopping: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    in_progress: Arc<AtomicUsize>,
    rebuild_running: AtomicBool,
    roots: Mutex<Vec<String>>,
    exclude_prefixes: Mutex<Vec<String>>,
    watcher: Mutex<Option<RootWatcher>>,
}

impl IndexerService {
    /// Build the service and start its writer thread.
    ///
    /// # Errors
    ///
    /// Returns a store error when writer configuration cannot be read.
    pub async fn start(
        store: SqliteStore,
        extractor: Arc<dyn betterspotlight_domain::ports::ContentExtractor>,
    ) -> Result<Arc<Self>> {
        let writer_config = WriterConfig {
            chunk_size_bytes: store.setting_i64(keys::CHUNK_SIZE_BYTES, 4_096).await? as usize,
            max_file_size: store.setting_i64(keys::MAX_FILE_SIZE, 104_857_600).await?,
        };

        let scheduler = Arc::new(PipelineScheduler::new(SchedulerConfig::default()));
        let telemetry = Arc::new(PipelineTelemetry::new());
        let writer = Arc::new(IndexWriter::new(
            store.clone(),
            extractor,
            Arc::clone(&telemetry),
            writer_config,
        ));

        let service = Arc::new(Self {
            store,
            scheduler,
            telemetry,
            writer,
            stopping: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            in_progress: Arc::new(AtomicUsize::new(0)),
            rebuild_running: AtomicBool::new(false),
            roots: Mutex::new(Vec::new()),
            exclude_prefixes: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        });
        service.spawn_writer_thread();
        Ok(service)
    }

    /// One OS thread owns the writer loop: blocking dequeues feed batched
    /// async store writes through the runtime handle.
    fn spawn_writer_thread(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let handle = tokio::runtime::Handle::current();
        std::thread::Builder::new()
            .name("bs-index-writer".to_owned())
            .spawn(move || {
                service.telemetry.set_prep_workers(1);
                loop {
                    let Some(head) = service
                        .scheduler
                        .dequeue_blocking(&service.stopping, &service.paused)
                    else {
                        break;
                    };

                    let mut batch = vec![head];
                    while batch.len() < WRITER_BATCH_MAX {
                        match service.scheduler.try_dequeue() {
                            Some(item) => batch.push(item),
                            None => break,
                        }
                    }
                    service.telemetry.set_writer_batch_depth(batch.len());
                    service.in_progress.store(batch.len(), Ordering::SeqCst);

                    handle.block_on(service.writer.write_batch(&batch));

                    service.in_progress.store(0, Ordering::SeqCst);
                    service.telemetry.set_writer_batch_depth(0);
                }
                info!("writer thread stopped");
            })
            .ok();
    }

    /// Stop the writer loop; called at service shutdown.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.scheduler.shutdown();
    }

    /// Scheduler handle for tests and the watcher.
    #[must_use]
    pub fn scheduler(&self) -> Arc<PipelineScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Build the IPC method handler backed by this service.
    #[must_use]
    pub fn method_handler(self: &Arc<Self>) -> MethodHandler {
        let service = Arc::clone(self);
        Arc::new(move |method: String, params: Value| {
            let service = Arc::clone(&service);
            Box::pin(async move { service.dispatch(&method, params).await })
        })
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "getQueueStatus" => Ok(self.queue_status()),
            "addRoots" => self.handle_add_roots(&params),
            "removeRoot" => self.handle_remove_root(&params),
            "rebuild" => self.handle_rebuild(),
            "pause" => {
                self.paused.store(true, Ordering::SeqCst);
                self.scheduler.notify_all();
                Ok(json!({"paused": true}))
            }
            "resume" => {
                self.paused.store(false, Ordering::SeqCst);
                self.scheduler.notify_all();
                Ok(json!({"paused": false}))
            }
            "flush" => self.handle_flush().await,
            "deleteAll" => {
                self.store.delete_all().await?;
                Ok(json!({"ok": true}))
            }
            other => Err(Error::not_found(format!("method '{other}'"))),
        }
    }

    fn queue_status(&self) -> Value {
        let stats = self.scheduler.stats();
        let telemetry = self.telemetry.snapshot();
        json!({
            "pending": stats.live_depth + stats.rebuild_depth,
            "processing": self.in_progress.load(Ordering::SeqCst),
            "preparing": 0,
            "writing": telemetry.writer_batch_depth,
            "paused": self.paused.load(Ordering::SeqCst),
            "coalesced": stats.coalesced,
            "staleDropped": stats.stale_dropped,
            "dropped": stats.dropped_live + stats.dropped_rebuild,
            "droppedQueueFull": stats.dropped_queue_full,
            "droppedMemorySoft": stats.dropped_memory_soft,
            "droppedMemoryHard": stats.dropped_memory_hard,
            "droppedWriterLag": stats.dropped_writer_lag,
            "dispatchedLive": stats.dispatched_live,
            "dispatchedRebuild": stats.dispatched_rebuild,
            "writerBatchDepth": telemetry.writer_batch_depth,
            "prepWorkers": telemetry.prep_workers,
            "writerLiveShare": telemetry.writer_live_share,
            "failed": telemetry.items_failed,
        })
    }

    fn handle_add_roots(&self, params: &Value) -> Result<Value> {
        let roots: Vec<String> = params
            .get("roots")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_params("'roots' array is required"))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        if roots.is_empty() {
            return Err(Error::invalid_params("'roots' must not be empty"));
        }

        if let Some(exclude) = params.get("excludePaths").and_then(Value::as_array) {
            if let Ok(mut prefixes) = self.exclude_prefixes.lock() {
                for prefix in exclude.iter().filter_map(Value::as_str) {
                    if !prefixes.iter().any(|p| p == prefix) {
                        prefixes.push(prefix.to_owned());
                    }
                }
            }
        }
        let excludes = self
            .exclude_prefixes
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default();
        let mut enqueued = 0u64;
        for root in &roots {
            for path in scan_root(Path::new(root), &excludes) {
                if self.scheduler.enqueue(&path, PipelineLane::Rebuild) {
                    enqueued += 1;
                }
            }
        }

        {
            let mut known = self
                .roots
                .lock()
                .map_err(|_| Error::internal("roots lock poisoned"))?;
            for root in &roots {
                if !known.contains(root) {
                    known.push(root.clone());
                }
            }
        }

        // Live events for the new roots.
        if let Ok(mut slot) = self.watcher.lock() {
            if slot.is_none() {
                match RootWatcher::new(self.scheduler()) {
                    Ok(w) => *slot = Some(w),
                    Err(e) => warn!(error = %e, "file watching unavailable"),
                }
            }
            if let Some(watcher) = slot.as_mut() {
                for root in &roots {
                    watcher.watch(Path::new(root));
                }
            }
        }

        info!(roots = roots.len(), enqueued, "roots added");
        Ok(json!({"added": roots.len(), "enqueued": enqueued}))
    }

    fn handle_remove_root(&self, params: &Value) -> Result<Value> {
        let root = params
            .get("root")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_params("'root' is required"))?;

        let removed = {
            let mut known = self
                .roots
                .lock()
                .map_err(|_| Error::internal("roots lock poisoned"))?;
            let before = known.len();
            known.retain(|r| r != root);
            before != known.len()
        };
        if let Ok(mut slot) = self.watcher.lock() {
            if let Some(watcher) = slot.as_mut() {
                watcher.unwatch(Path::new(root));
            }
        }
        if !removed {
            return Err(Error::not_found(format!("root '{root}'")));
        }
        Ok(json!({"removed": true}))
    }

    fn handle_rebuild(&self) -> Result<Value> {
        if self.rebuild_running.swap(true, Ordering::SeqCst) {
            return Err(Error::already_running("rebuild already in progress"));
        }
        let roots = self
            .roots
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default();
        let excludes = self
            .exclude_prefixes
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default();

        let mut enqueued = 0u64;
        for root in &roots {
            for path in scan_root(Path::new(root), &excludes) {
                if self.scheduler.enqueue(&path, PipelineLane::Rebuild) {
                    enqueued += 1;
                }
            }
        }
        self.rebuild_running.store(false, Ordering::SeqCst);
        Ok(json!({"enqueued": enqueued}))
    }

    async fn handle_flush(&self) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            if self.scheduler.total_depth() == 0 && self.in_progress.load(Ordering::SeqCst) == 0 {
                return Ok(json!({"flushed": true}));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        Err(Error::timeout("flush"))
    }
}

/// Resolve the store path: `BETTERSPOTLIGHT_DATA_DIR` override or the
/// OS-specific app-support folder.
#[must_use]
pub fn default_db_path() -> PathBuf {
    std::env::var(betterspotlight_domain::constants::ipc::ENV_DATA_DIR)
        .ok()
        .map_or_else(
            || {
                dirs_fallback()
                    .join("betterspotlight")
                    .join("index.db")
            },
            |dir| PathBuf::from(dir).join("index.db"),
        )
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME").map_or_else(
        |_| std::env::temp_dir(),
        |home| PathBuf::from(home).join(".local").join("share"),
    )
}
