//! Pipeline telemetry actor: totals the writer-lane share, drop reasons,
//! prep-worker count and writer batch depth for health snapshots.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::scheduler::PipelineLane;

/// Snapshot exposed verbatim in health responses.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub writer_dispatch_total: u64,
    pub writer_live_share: f64,
    pub drop_reasons: HashMap<String, u64>,
    pub prep_workers: usize,
    pub writer_batch_depth: usize,
    pub items_written: u64,
    pub items_failed: u64,
}

#[derive(Default)]
struct TelemetryState {
    writer_dispatch_live: u64,
    writer_dispatch_rebuild: u64,
    drop_reasons: HashMap<String, u64>,
    prep_workers: usize,
    writer_batch_depth: usize,
    items_written: u64,
    items_failed: u64,
}

/// Telemetry actor; all writes funnel through the owning service.
#[derive(Default)]
pub struct PipelineTelemetry {
    state: Mutex<TelemetryState>,
}

impl PipelineTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_writer_dispatch(&self, lane: PipelineLane) {
        if let Ok(mut state) = self.state.lock() {
            match lane {
                PipelineLane::Live => state.writer_dispatch_live += 1,
                PipelineLane::Rebuild => state.writer_dispatch_rebuild += 1,
            }
        }
    }

    pub fn record_drop(&self, reason: &str) {
        if let Ok(mut state) = self.state.lock() {
            *state.drop_reasons.entry(reason.to_owned()).or_insert(0) += 1;
        }
    }

    pub fn record_written(&self, count: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.items_written += count;
        }
    }

    pub fn record_failed(&self, count: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.items_failed += count;
        }
    }

    pub fn set_prep_workers(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.prep_workers = count;
        }
    }

    pub fn set_writer_batch_depth(&self, depth: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.writer_batch_depth = depth;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.state.lock().map_or_else(
            |_| TelemetrySnapshot::default(),
            |state| {
                let total = state.writer_dispatch_live + state.writer_dispatch_rebuild;
                TelemetrySnapshot {
                    writer_dispatch_total: total,
                    writer_live_share: if total == 0 {
                        0.0
                    } else {
                        state.writer_dispatch_live as f64 / total as f64
                    },
                    drop_reasons: state.drop_reasons.clone(),
                    prep_workers: state.prep_workers,
                    writer_batch_depth: state.writer_batch_depth,
                    items_written: state.items_written,
                    items_failed: state.items_failed,
                }
            },
        )
    }
}
