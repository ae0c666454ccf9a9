//! Unit test suite for betterspotlight-runtime
//!
//! Run with: `cargo test -p betterspotlight-runtime --test unit`

#[path = "unit/environment_tests.rs"]
mod environment_tests;

#[path = "unit/supervisor_tests.rs"]
mod supervisor_tests;
