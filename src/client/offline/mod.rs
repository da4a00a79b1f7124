//! # Offline Queue
//!
//! Items captured without connectivity wait here until a pass converges them
//! with the remote archive.
//!
//! ## Key Components
//!
//! - `queue.rs`: [`SyncItemStore`], the persisted item map and its state machine
//! - `retry.rs`: backoff strategies for asset and pass retries

pub mod queue;
pub mod retry;

pub use queue::SyncItemStore;
pub use retry::{AutoRetryState, BackoffStrategy};
