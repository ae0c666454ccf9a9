//! Unit test suite for betterspotlight-domain
//!
//! Run with: `cargo test -p betterspotlight-domain --test unit`

#[path = "unit/error_tests.rs"]
mod error_tests;

#[path = "unit/entities_tests.rs"]
mod entities_tests;
