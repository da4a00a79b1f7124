//! FieldSync - Main Library
//!
//! FieldSync is the offline-first sync engine of a field documentation client.
//! Observations (photos, videos, audio) and voice tasks are captured without
//! connectivity, queued durably on the device, and uploaded to a remote
//! archive whenever the network allows.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by every layer
//!   - Queue item model, state machines, events
//!   - Settings, network snapshot, configuration
//!   - Error taxonomy
//!
//! - **`client`** - The engine itself
//!   - SQLite-backed queue and durable media storage
//!   - Archive API client (reqwest)
//!   - Scheduler, upload pipeline, progress and metrics
//!
//! # Feature Flags
//!
//! - **`cli`** (default) - builds the `fieldsync` binary with
//!   `tracing-subscriber` output and `.env` loading
//!
//! # Usage
//!
//! ```rust,no_run
//! use fieldsync::client::{Config, SyncEngine};
//! use fieldsync::shared::NetworkState;
//!
//! # async fn example() -> fieldsync::shared::SyncResult<()> {
//! let engine = SyncEngine::open(Config::from_env()?).await?;
//! engine.handle_network_change(NetworkState::wifi()).await;
//! let report = engine.start_sync().await;
//! println!("{:?}", report);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The engine is shared as `Arc<SyncEngine>`. Internal state sits behind
//! `tokio::sync::RwLock`, events fan out over a `broadcast` channel, and a
//! single atomic guard keeps sync passes from overlapping.
//!
//! # Error Handling
//!
//! Fallible operations return [`shared::SyncResult`]. Errors are classified as
//! retryable (network, timeout, 5xx) or permanent (4xx, missing local file);
//! the classification drives the retry policy.

/// Shared types and data structures
pub mod shared;

/// Offline-first sync engine
pub mod client;
