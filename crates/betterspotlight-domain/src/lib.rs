//! Domain layer for BetterSpotlight.
//!
//! Entities, value objects, port traits and the error taxonomy shared by the
//! store, the IPC transport and the four service processes. This crate has no
//! I/O of its own; everything here is plain data plus the seams the services
//! plug into.

pub mod constants;
pub mod entities;
pub mod error;
pub mod ports;
pub mod utils;
pub mod value_objects;

pub use error::{Error, Result};
