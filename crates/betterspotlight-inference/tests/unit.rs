//! Unit test suite for betterspotlight-inference
//!
//! Run with: `cargo test -p betterspotlight-inference --test unit`

#[path = "unit/service_tests.rs"]
mod service_tests;

#[path = "unit/worker_tests.rs"]
mod worker_tests;
