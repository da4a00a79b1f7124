//! Test suite for FieldSync
//!
//! Integration tests run the engine against a wiremock archive server.
//! Property tests cover the retry policy, the state machines and progress.

#[macro_use]
pub mod common;
pub mod property;
