//! Item State Machines
//!
//! Observations and tasks move through separate state machines. Both are closed
//! enums wrapped in [`SyncState`], so an item can never carry a state from the
//! other variant. Every change goes through [`SyncState::transition`], which
//! consults the transition tables below.
//!
//! ## Observation
//!
//! ```text
//! pending -> uploading_metadata -> uploading_media -> complete | partial | failed
//! ```
//!
//! ## Task
//!
//! ```text
//! pending -> transcribing -> review -> accepted -> uploading -> complete | failed
//! ```

use crate::shared::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observation sync states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObservationState {
    /// Waiting for a sync pass
    Pending,
    /// Metadata is being submitted
    UploadingMetadata,
    /// Metadata acknowledged, assets are being uploaded
    UploadingMedia,
    /// Metadata and every asset are on the server
    Complete,
    /// Some assets uploaded, the rest failed
    Partial,
    /// Nothing beyond metadata (or not even metadata) reached the server
    Failed,
}

/// Voice task states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Recorded, not yet transcribed
    Pending,
    /// Transcription in progress
    Transcribing,
    /// Awaiting human review of the transcription
    Review,
    /// Reviewed and ready to upload
    Accepted,
    /// Upload in progress
    Uploading,
    /// Uploaded
    Complete,
    /// Upload failed
    Failed,
}

impl ObservationState {
    /// Transition table for observations
    pub fn can_transition_to(self, next: ObservationState) -> bool {
        use ObservationState::*;
        matches!(
            (self, next),
            (Pending, UploadingMetadata)
                | (Failed, UploadingMetadata)
                | (Partial, UploadingMetadata)
                | (UploadingMetadata, UploadingMedia)
                | (UploadingMetadata, Failed)
                | (UploadingMetadata, Pending)
                | (UploadingMedia, Complete)
                | (UploadingMedia, Partial)
                | (UploadingMedia, Failed)
                | (UploadingMedia, Pending)
                | (Complete, Pending)
                | (Partial, Pending)
                | (Failed, Pending)
        )
    }

    /// States that only exist while a pass is running
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::UploadingMetadata | Self::UploadingMedia)
    }
}

impl TaskState {
    /// Transition table for tasks
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Transcribing)
                | (Transcribing, Review)
                | (Transcribing, Pending)
                | (Review, Accepted)
                | (Review, Pending)
                | (Accepted, Uploading)
                | (Failed, Uploading)
                | (Uploading, Complete)
                | (Uploading, Failed)
                | (Uploading, Accepted)
                | (Complete, Accepted)
                | (Failed, Accepted)
        )
    }

    /// States that only exist while work is running
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Transcribing | Self::Uploading)
    }
}

/// Kind of queued item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Field observation with photos/videos/audio
    Observation,
    /// Voice task with a human-reviewed transcription
    Task,
}

/// Sync state of an item, tagged by item kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// Observation state machine
    Observation(ObservationState),
    /// Task state machine
    Task(TaskState),
}

/// Final state of an item after its assets were processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// All assets complete
    Complete,
    /// At least one asset complete, at least one failed
    Partial,
    /// No asset complete
    Failed,
}

impl SyncState {
    /// Initial state for a new item of the given kind
    pub fn initial(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Observation => Self::Observation(ObservationState::Pending),
            ItemKind::Task => Self::Task(TaskState::Pending),
        }
    }

    /// Item kind encoded by this state
    pub fn kind(self) -> ItemKind {
        match self {
            Self::Observation(_) => ItemKind::Observation,
            Self::Task(_) => ItemKind::Task,
        }
    }

    /// Whether `next` is reachable from the current state
    pub fn can_transition_to(self, next: SyncState) -> bool {
        match (self, next) {
            (Self::Observation(a), Self::Observation(b)) => a.can_transition_to(b),
            (Self::Task(a), Self::Task(b)) => a.can_transition_to(b),
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions outside the table
    pub fn transition(&mut self, next: SyncState) -> SyncResult<()> {
        if *self == next {
            return Ok(());
        }
        if !self.can_transition_to(next) {
            return Err(SyncError::invalid_transition(*self, next));
        }
        *self = next;
        Ok(())
    }

    /// Whether the item has fully converged with the server
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            Self::Observation(ObservationState::Complete) | Self::Task(TaskState::Complete)
        )
    }

    /// Whether a sync pass may pick the item up
    pub fn is_uploadable(self) -> bool {
        matches!(
            self,
            Self::Observation(ObservationState::Pending)
                | Self::Observation(ObservationState::Failed)
                | Self::Observation(ObservationState::Partial)
                | Self::Task(TaskState::Accepted)
                | Self::Task(TaskState::Failed)
        )
    }

    /// Whether the state only exists while work is running
    pub fn is_in_flight(self) -> bool {
        match self {
            Self::Observation(s) => s.is_in_flight(),
            Self::Task(s) => s.is_in_flight(),
        }
    }

    /// State entered when a pass starts processing the item
    pub fn upload_started(self) -> SyncState {
        match self {
            Self::Observation(_) => Self::Observation(ObservationState::UploadingMetadata),
            Self::Task(_) => Self::Task(TaskState::Uploading),
        }
    }

    /// State entered once the server acknowledged the metadata
    pub fn media_phase(self) -> SyncState {
        match self {
            Self::Observation(_) => Self::Observation(ObservationState::UploadingMedia),
            Self::Task(_) => Self::Task(TaskState::Uploading),
        }
    }

    /// State entered when processing fails before or during upload
    pub fn failed(self) -> SyncState {
        match self {
            Self::Observation(_) => Self::Observation(ObservationState::Failed),
            Self::Task(_) => Self::Task(TaskState::Failed),
        }
    }

    /// Nearest resumable state that waits for the next pass
    ///
    /// Used by crash recovery, cancellation and explicit retries.
    pub fn resumable(self) -> SyncState {
        match self {
            Self::Observation(_) => Self::Observation(ObservationState::Pending),
            Self::Task(TaskState::Transcribing) | Self::Task(TaskState::Pending) => {
                Self::Task(TaskState::Pending)
            }
            Self::Task(TaskState::Review) => Self::Task(TaskState::Review),
            Self::Task(_) => Self::Task(TaskState::Accepted),
        }
    }

    /// State for an item whose assets were all processed
    ///
    /// Tasks have no partial state; a partially uploaded task is failed and
    /// resumes its remaining assets on retry.
    pub fn settled(self, settlement: Settlement) -> SyncState {
        match (self, settlement) {
            (Self::Observation(_), Settlement::Complete) => {
                Self::Observation(ObservationState::Complete)
            }
            (Self::Observation(_), Settlement::Partial) => {
                Self::Observation(ObservationState::Partial)
            }
            (Self::Observation(_), Settlement::Failed) => {
                Self::Observation(ObservationState::Failed)
            }
            (Self::Task(_), Settlement::Complete) => Self::Task(TaskState::Complete),
            (Self::Task(_), _) => Self::Task(TaskState::Failed),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Observation(ObservationState::Pending) | Self::Task(TaskState::Pending) => "pending",
            Self::Observation(ObservationState::UploadingMetadata) => "uploading_metadata",
            Self::Observation(ObservationState::UploadingMedia) => "uploading_media",
            Self::Observation(ObservationState::Complete) | Self::Task(TaskState::Complete) => "complete",
            Self::Observation(ObservationState::Partial) => "partial",
            Self::Observation(ObservationState::Failed) | Self::Task(TaskState::Failed) => "failed",
            Self::Task(TaskState::Transcribing) => "transcribing",
            Self::Task(TaskState::Review) => "review",
            Self::Task(TaskState::Accepted) => "accepted",
            Self::Task(TaskState::Uploading) => "uploading",
        };
        f.write_str(name)
    }
}

/// Media asset sync states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// Waiting for upload
    #[default]
    Pending,
    /// Upload in progress
    Uploading,
    /// Uploaded and registered
    Complete,
    /// Upload failed
    Failed,
}
