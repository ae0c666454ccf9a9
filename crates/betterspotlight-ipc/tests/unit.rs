//! Unit test suite for betterspotlight-ipc
//!
//! Run with: `cargo test -p betterspotlight-ipc --test unit`

#[path = "unit/client_server_tests.rs"]
mod client_server_tests;

#[path = "unit/reconnect_tests.rs"]
mod reconnect_tests;
