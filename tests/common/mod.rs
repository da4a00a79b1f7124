//! Common test utilities and helpers
//!
//! - A wiremock-backed archive server
//! - Engine and capture-file fixtures
//! - Custom assertion macros

pub mod archive_server;
#[macro_use]
pub mod assertions;
pub mod fixtures;

pub use archive_server::*;
pub use fixtures::*;
