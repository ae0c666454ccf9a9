//! Process supervision and runtime environment.
//!
//! The host process owns one [`Supervisor`] holding the four service
//! children, and one [`RuntimeContext`] describing this launch's instance
//! directory (sockets, pid files, metadata). Stale sibling instances are
//! reconciled at startup by pid liveness.

pub mod environment;
pub mod supervisor;

pub use environment::{
    cleanup_orphan_runtime_directories, init_runtime_context, process_is_alive, RuntimeContext,
};
pub use supervisor::{ServiceSnapshot, ServiceState, Supervisor, SupervisorEvent};
