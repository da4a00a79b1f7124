//! # Sync Pass
//!
//! Everything that runs while the engine converges the queue with the remote
//! archive.
//!
//! ## Architecture
//!
//! - **Network Monitor**: edge-triggered connectivity state
//! - **Upload Pipeline**: metadata, then each asset of one item
//! - **Scheduler**: the single pass, cancellation and auto-retry
//! - **Sync State**: byte-weighted progress of the running pass
//! - **Metrics**: pass counters over the engine's lifetime

pub mod metrics;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;
pub mod upload;

pub use metrics::SyncMetrics;
pub use network_monitor::{NetworkMonitor, NetworkTransition};
pub use scheduler::{SkipReason, SyncReport, SyncScheduler};
pub use sync_state::ProgressTracker;
pub use upload::{ItemOutcome, OutcomeKind, UploadPipeline};
