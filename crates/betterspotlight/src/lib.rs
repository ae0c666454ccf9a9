//! Host-side pieces of BetterSpotlight: typed configuration and service
//! wiring shared by the binary and its tests.

pub mod config;

pub use config::AppConfig;
