//! Root scanning and live file watching.

use std::path::Path;
use std::sync::Arc;

use betterspotlight_domain::{Error, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::scheduler::{PipelineLane, PipelineScheduler};

/// Enumerate indexable files under `root`, skipping hidden entries and
/// excluded prefixes.
#[must_use]
pub fn scan_root(root: &Path, exclude_prefixes: &[String]) -> Vec<String> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.'))
        })
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .filter(|path| !exclude_prefixes.iter().any(|p| path.starts_with(p.as_str())))
        .collect()
}

/// Watches roots with `notify` and feeds changed paths into the Live lane.
pub struct RootWatcher {
    watcher: RecommendedWatcher,
}

impl RootWatcher {
    /// Create a watcher pushing events into `scheduler`.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform watcher cannot be created.
    pub fn new(scheduler: Arc<PipelineScheduler>) -> Result<Self> {
        let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let Ok(event) = event else { return };
            if !matches!(
                event.kind,
                notify::EventKind::Create(_)
                    | notify::EventKind::Modify(_)
                    | notify::EventKind::Remove(_)
            ) {
                return;
            }
            for path in event.paths {
                let path = path.to_string_lossy().into_owned();
                if matches!(event.kind, notify::EventKind::Remove(_)) {
                    scheduler.invalidate(&path);
                }
                // Removed paths still go through the writer, which deletes
                // the item when the stat fails.
                if !scheduler.enqueue(&path, PipelineLane::Live) {
                    debug!(path, "live event dropped by scheduler");
                }
            }
        })
        .map_err(|e| Error::internal(format!("failed to create file watcher: {e}")))?;

        Ok(Self { watcher })
    }

    /// Start watching `root` recursively.
    pub fn watch(&mut self, root: &Path) {
        if let Err(e) = self.watcher.watch(root, RecursiveMode::Recursive) {
            warn!(root = %root.display(), error = %e, "failed to watch root");
        }
    }

    /// Stop watching `root`.
    pub fn unwatch(&mut self, root: &Path) {
        let _ = self.watcher.unwatch(root);
    }
}
