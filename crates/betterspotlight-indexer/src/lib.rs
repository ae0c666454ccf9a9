//! Indexing pipeline: dual-lane scheduler, telemetry, chunking, the batch
//! writer that feeds the store atomically, and the indexer service.

pub mod chunker;
pub mod scheduler;
pub mod service;
pub mod telemetry;
pub mod watcher;
pub mod writer;

pub use scheduler::{
    PipelineLane, PipelineScheduler, ScheduledItem, SchedulerConfig, SchedulerStats, WorkItem,
};
pub use telemetry::{PipelineTelemetry, TelemetrySnapshot};
