//! Two-lane pipeline scheduler: weighted fair dispatch between Live
//! (user-driven edits) and Rebuild (bulk re-indexing) with admission caps,
//! coalescing, stale-epoch drops and full drop accounting.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// Dispatch lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineLane {
    Live,
    Rebuild,
}

impl PipelineLane {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Rebuild => "rebuild",
        }
    }
}

/// One unit of indexing work. The epoch marks which version of the path
/// this entry was queued for; entries older than the path's current epoch
/// are dropped at dispatch.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: String,
    pub epoch: u64,
}

/// A dispatched item with its lane tag.
#[derive(Debug, Clone)]
pub struct ScheduledItem {
    pub item: WorkItem,
    pub lane: PipelineLane,
}

/// Scheduler configuration. Zero caps fall back to the defaults; the live
/// ratio is clamped into 1..=99.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub live_lane_cap: usize,
    pub rebuild_lane_cap: usize,
    pub live_dispatch_ratio_pct: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            live_lane_cap: 4_000,
            rebuild_lane_cap: 20_000,
            live_dispatch_ratio_pct: 70,
        }
    }
}

/// Counter snapshot, exposed verbatim in health.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub live_depth: usize,
    pub rebuild_depth: usize,
    pub dropped_live: u64,
    pub dropped_rebuild: u64,
    pub dropped_queue_full: u64,
    pub dropped_memory_soft: u64,
    pub dropped_memory_hard: u64,
    pub dropped_writer_lag: u64,
    pub stale_dropped: u64,
    pub coalesced: u64,
    pub dispatched_live: u64,
    pub dispatched_rebuild: u64,
}

#[derive(Default)]
struct State {
    live: VecDeque<WorkItem>,
    rebuild: VecDeque<WorkItem>,
    queued_live: HashSet<String>,
    queued_rebuild: HashSet<String>,
    current_epoch: HashMap<String, u64>,
    dispatch_cycle: u64,
    shutdown: bool,
    stats: SchedulerStats,
}

/// Process-local scheduler actor protected by one mutex and one condvar.
pub struct PipelineScheduler {
    config: SchedulerConfig,
    state: Mutex<State>,
    cv: Condvar,
}

impl PipelineScheduler {
    #[must_use]
    pub fn new(mut config: SchedulerConfig) -> Self {
        if config.live_lane_cap == 0 {
            config.live_lane_cap = SchedulerConfig::default().live_lane_cap;
        }
        if config.rebuild_lane_cap == 0 {
            config.rebuild_lane_cap = SchedulerConfig::default().rebuild_lane_cap;
        }
        config.live_dispatch_ratio_pct = config.live_dispatch_ratio_pct.clamp(1, 99);
        Self {
            config,
            state: Mutex::new(State::default()),
            cv: Condvar::new(),
        }
    }

    /// Admit a path into a lane. Returns false when rejected (shutdown or
    /// queue cap). A path already queued in the lane is coalesced.
    pub fn enqueue(&self, path: &str, lane: PipelineLane) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.shutdown {
            return false;
        }

        let queued = match lane {
            PipelineLane::Live => &state.queued_live,
            PipelineLane::Rebuild => &state.queued_rebuild,
        };
        if queued.contains(path) {
            state.stats.coalesced += 1;
            return true;
        }

        let (depth, cap) = match lane {
            PipelineLane::Live => (state.live.len(), self.config.live_lane_cap),
            PipelineLane::Rebuild => (state.rebuild.len(), self.config.rebuild_lane_cap),
        };
        if depth >= cap {
            match lane {
                PipelineLane::Live => state.stats.dropped_live += 1,
                PipelineLane::Rebuild => state.stats.dropped_rebuild += 1,
            }
            state.stats.dropped_queue_full += 1;
            return false;
        }

        let epoch = *state.current_epoch.entry(path.to_owned()).or_insert(0);
        let item = WorkItem {
            path: path.to_owned(),
            epoch,
        };
        match lane {
            PipelineLane::Live => {
                state.live.push_back(item);
                state.queued_live.insert(path.to_owned());
            }
            PipelineLane::Rebuild => {
                state.rebuild.push_back(item);
                state.queued_rebuild.insert(path.to_owned());
            }
        }
        drop(state);
        self.cv.notify_one();
        true
    }

    /// Invalidate any queued entries for `path` (file deleted, root
    /// removed). Already-queued entries are dropped at dispatch.
    pub fn invalidate(&self, path: &str) {
        if let Ok(mut state) = self.state.lock() {
            *state.current_epoch.entry(path.to_owned()).or_insert(0) += 1;
        }
    }

    /// Block until an item is available (or shutdown/stop/pause). Returns
    /// `None` on shutdown, stop, or pause wake-up.
    pub fn dequeue_blocking(
        &self,
        stopping: &AtomicBool,
        paused: &AtomicBool,
    ) -> Option<ScheduledItem> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        loop {
            if state.shutdown || stopping.load(Ordering::SeqCst) {
                return None;
            }
            if !paused.load(Ordering::SeqCst)
                && (!state.live.is_empty() || !state.rebuild.is_empty())
            {
                break;
            }
            state = self.cv.wait(state).ok()?;
        }
        if paused.load(Ordering::SeqCst) {
            return None;
        }
        Self::pop_next_locked(&self.config, &mut state)
    }

    /// Non-blocking dequeue.
    pub fn try_dequeue(&self) -> Option<ScheduledItem> {
        let mut state = self.state.lock().ok()?;
        if state.shutdown {
            return None;
        }
        Self::pop_next_locked(&self.config, &mut state)
    }

    fn pop_next_locked(config: &SchedulerConfig, state: &mut State) -> Option<ScheduledItem> {
        loop {
            if state.live.is_empty() && state.rebuild.is_empty() {
                return None;
            }

            let lane = if state.live.is_empty() {
                PipelineLane::Rebuild
            } else if state.rebuild.is_empty() {
                PipelineLane::Live
            } else {
                let slot = state.dispatch_cycle % 100;
                state.dispatch_cycle += 1;
                if slot < config.live_dispatch_ratio_pct {
                    PipelineLane::Live
                } else {
                    PipelineLane::Rebuild
                }
            };

            let item = match lane {
                PipelineLane::Live => {
                    let item = state.live.pop_front()?;
                    state.queued_live.remove(&item.path);
                    item
                }
                PipelineLane::Rebuild => {
                    let item = state.rebuild.pop_front()?;
                    state.queued_rebuild.remove(&item.path);
                    item
                }
            };

            let current = state.current_epoch.get(&item.path).copied().unwrap_or(0);
            if item.epoch < current {
                state.stats.stale_dropped += 1;
                continue;
            }

            match lane {
                PipelineLane::Live => state.stats.dispatched_live += 1,
                PipelineLane::Rebuild => state.stats.dispatched_rebuild += 1,
            }
            return Some(ScheduledItem { item, lane });
        }
    }

    /// Record an out-of-band drop (memory pressure, writer lag).
    pub fn record_drop(&self, lane: PipelineLane, reason: &str) {
        if let Ok(mut state) = self.state.lock() {
            match lane {
                PipelineLane::Live => state.stats.dropped_live += 1,
                PipelineLane::Rebuild => state.stats.dropped_rebuild += 1,
            }
            match reason {
                "memory_soft" => state.stats.dropped_memory_soft += 1,
                "memory_hard" => state.stats.dropped_memory_hard += 1,
                "writer_lag" => state.stats.dropped_writer_lag += 1,
                _ => state.stats.dropped_queue_full += 1,
            }
        }
    }

    /// Current counters and depths.
    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().map_or_else(
            |_| SchedulerStats::default(),
            |state| {
                let mut stats = state.stats;
                stats.live_depth = state.live.len();
                stats.rebuild_depth = state.rebuild.len();
                stats
            },
        )
    }

    /// Combined queue depth.
    pub fn total_depth(&self) -> usize {
        self.state
            .lock()
            .map_or(0, |state| state.live.len() + state.rebuild.len())
    }

    /// Shut down: every blocked dequeue returns `None`.
    pub fn shutdown(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.shutdown = true;
        }
        self.cv.notify_all();
    }

    /// Wake all waiters (pause/stop flag flips).
    pub fn notify_all(&self) {
        self.cv.notify_all();
    }
}
