//! Persistent store for BetterSpotlight.
//!
//! Single-process exclusive writer, multi-process readers; concurrency is
//! mediated at the database layer (WAL, 30 s busy timeout, and an
//! application-level busy-retry loop for the contention paths the native
//! busy handler does not cover).
//!
//! The critical invariant: a chunk row never exists without its inverted
//! index row, nor the reverse. [`SqliteStore::insert_chunks`] maintains it
//! inside one savepoint.

mod chunks;
mod failures;
mod feedback;
mod fts;
mod health;
mod items;
mod learning;
mod maintenance;
pub mod schema;
mod settings;
mod store;
mod vectors;

pub use fts::{sanitize_fts_query_relaxed, sanitize_fts_query_strict};
pub use store::SqliteStore;
