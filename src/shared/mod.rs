//! Shared Module
//!
//! Platform-agnostic types used by every layer of the engine: the queue item
//! model, state machines, events, settings, configuration and errors. All types
//! serialize with serde so they can be persisted and handed to UI layers.

/// Error taxonomy
pub mod error;

/// Engine events
pub mod event;

/// Queue item model
pub mod item;

/// Item and asset state machines
pub mod state;

/// Pass progress snapshot
pub mod progress;

/// Persisted sync policy
pub mod settings;

/// Connectivity snapshot
pub mod network;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{SyncError, SyncResult};
pub use event::{EventType, PassSummary, SyncEvent};
pub use item::{ItemPatch, ItemPayload, MediaAsset, MediaType, NewItem, NewMedia, SyncItem};
pub use network::{ConnectionKind, NetworkState};
pub use progress::SyncProgress;
pub use settings::{SettingsPatch, SyncSettings};
pub use state::{AssetState, ItemKind, ObservationState, SyncState, TaskState};
