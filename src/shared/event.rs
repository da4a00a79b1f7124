//! Engine Event System
//!
//! Events emitted to subscribers (UI layers, the CLI, tests). Every event carries
//! a read-only snapshot; subscribers never mutate engine state.

use crate::shared::network::NetworkState;
use crate::shared::progress::SyncProgress;
use crate::shared::state::SyncState;
use serde::{Deserialize, Serialize};

/// Discriminant of a [`SyncEvent`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    StateChanged,
    ProgressUpdated,
    ItemSynced,
    ItemFailed,
    SyncStarted,
    SyncCompleted,
    SyncError,
    NetworkChanged,
}

/// Outcome counters of one pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub items_synced: u32,
    pub items_partial: u32,
    pub items_failed: u32,
    pub assets_uploaded: u32,
    pub bytes_uploaded: u64,
    pub cancelled: bool,
}

impl PassSummary {
    pub fn had_failures(&self) -> bool {
        self.items_partial > 0 || self.items_failed > 0
    }
}

/// Event emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// An item moved to a new state
    StateChanged {
        local_id: String,
        state: SyncState,
    },
    /// Aggregate pass progress changed
    ProgressUpdated { progress: SyncProgress },
    /// An item reached `complete`
    ItemSynced {
        local_id: String,
        remote_id: String,
    },
    /// An item ended the pass as `failed` or `partial`
    ItemFailed {
        local_id: String,
        error: String,
        retryable: bool,
    },
    /// A pass started
    SyncStarted { eligible_items: usize },
    /// A pass finished (possibly cancelled)
    SyncCompleted { summary: PassSummary },
    /// A pass could not run; `retry_in_ms` is set when an auto-retry was scheduled
    SyncError {
        message: String,
        retry_in_ms: Option<u64>,
    },
    /// Connectivity changed
    NetworkChanged { network: NetworkState },
}

impl SyncEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::StateChanged { .. } => EventType::StateChanged,
            Self::ProgressUpdated { .. } => EventType::ProgressUpdated,
            Self::ItemSynced { .. } => EventType::ItemSynced,
            Self::ItemFailed { .. } => EventType::ItemFailed,
            Self::SyncStarted { .. } => EventType::SyncStarted,
            Self::SyncCompleted { .. } => EventType::SyncCompleted,
            Self::SyncError { .. } => EventType::SyncError,
            Self::NetworkChanged { .. } => EventType::NetworkChanged,
        }
    }
}
