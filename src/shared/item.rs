//! Queue Item Types
//!
//! [`SyncItem`] is the unit of work the engine converges with the remote
//! archive. Observations and voice tasks share the same shape; the kind lives
//! in [`SyncState`].

use crate::shared::state::{AssetState, ItemKind, Settlement, SyncState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Message recorded when an interrupted item is put back in the queue
pub const INTERRUPTED_MESSAGE: &str = "Sync was interrupted. It will resume on the next sync.";

/// Media asset type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Photo,
    Video,
    Audio,
}

impl MediaType {
    /// Name used by the remote archive
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Domain fields carried to the server verbatim
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// One binary attached to an item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    /// Durable, app-private location
    pub local_uri: PathBuf,
    /// Set once the server registered the asset
    pub remote_url: Option<String>,
    pub content_type: String,
    pub file_size: u64,
    pub sync_state: AssetState,
    /// 0 to 100
    pub upload_progress: u8,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl MediaAsset {
    /// File name used for the upload request
    pub fn file_name(&self) -> String {
        self.local_uri
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn is_complete(&self) -> bool {
        self.sync_state == AssetState::Complete
    }
}

/// A queued observation or task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub local_id: String,
    pub payload: ItemPayload,
    pub media: Vec<MediaAsset>,
    pub sync_state: SyncState,
    /// Set once, when the server acknowledged item creation
    pub remote_id: Option<String>,
    pub retry_count: u32,
    pub last_sync_error: Option<String>,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub sync_completed_at: Option<DateTime<Utc>>,
    /// Payload edited after the server acknowledged creation
    #[serde(default)]
    pub metadata_dirty: bool,
    /// Last failure was permanent; only an explicit retry re-queues the item
    #[serde(default)]
    pub requires_manual_retry: bool,
}

impl SyncItem {
    pub fn kind(&self) -> ItemKind {
        self.sync_state.kind()
    }

    /// Whether a pass should pick the item up under the given retry budget
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        self.sync_state.is_uploadable()
            && !self.requires_manual_retry
            && self.retry_count < max_retries
    }

    /// Assets still waiting for upload
    pub fn pending_assets(&self) -> impl Iterator<Item = &MediaAsset> {
        self.media.iter().filter(|asset| !asset.is_complete())
    }

    /// Bytes still to upload
    pub fn pending_bytes(&self) -> u64 {
        self.pending_assets().map(|asset| asset.file_size).sum()
    }

    pub fn asset_mut(&mut self, asset_id: &str) -> Option<&mut MediaAsset> {
        self.media.iter_mut().find(|asset| asset.id == asset_id)
    }

    /// Aggregate asset states once every asset was attempted
    pub fn settlement(&self) -> Settlement {
        let complete = self.media.iter().filter(|asset| asset.is_complete()).count();
        if complete == self.media.len() {
            Settlement::Complete
        } else if complete > 0 {
            Settlement::Partial
        } else {
            Settlement::Failed
        }
    }

    /// Normalize a state left behind by a process that died mid-work
    ///
    /// Returns `true` when anything changed.
    pub fn recover_from_interruption(&mut self) -> bool {
        let mut changed = false;

        if self.sync_state.is_in_flight() {
            self.sync_state = self.sync_state.resumable();
            self.last_sync_error = Some(INTERRUPTED_MESSAGE.to_string());
            changed = true;
        }

        for asset in &mut self.media {
            if asset.sync_state == AssetState::Uploading {
                asset.sync_state = AssetState::Pending;
                asset.upload_progress = 0;
                changed = true;
            }
        }

        changed
    }
}

/// Media to attach to a new item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewMedia {
    /// Capture location; copied into durable storage
    pub source_uri: PathBuf,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub content_type: String,
}

impl NewMedia {
    pub fn new(source_uri: impl Into<PathBuf>, media_type: MediaType, content_type: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            media_type,
            content_type: content_type.into(),
        }
    }

    /// JPEG photo
    pub fn photo(source_uri: impl Into<PathBuf>) -> Self {
        Self::new(source_uri, MediaType::Photo, "image/jpeg")
    }

    /// M4A voice recording
    pub fn audio(source_uri: impl Into<PathBuf>) -> Self {
        Self::new(source_uri, MediaType::Audio, "audio/m4a")
    }
}

/// Fields for `add_item`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub kind: ItemKind,
    pub payload: ItemPayload,
    pub media: Vec<NewMedia>,
}

impl NewItem {
    pub fn observation(payload: ItemPayload, media: Vec<NewMedia>) -> Self {
        Self {
            kind: ItemKind::Observation,
            payload,
            media,
        }
    }

    pub fn task(payload: ItemPayload, media: Vec<NewMedia>) -> Self {
        Self {
            kind: ItemKind::Task,
            payload,
            media,
        }
    }
}

/// Partial payload update for `update_item`; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub project_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub transcription: Option<String>,
    pub translation: Option<String>,
    pub classification: Option<String>,
    pub priority: Option<String>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a payload; returns `true` when a field changed
    pub fn apply(self, payload: &mut ItemPayload) -> bool {
        let mut changed = false;
        let mut set = |slot: &mut Option<String>, value: Option<String>| {
            if let Some(value) = value {
                if slot.as_deref() != Some(value.as_str()) {
                    *slot = Some(value);
                    changed = true;
                }
            }
        };
        set(&mut payload.project_id, self.project_id);
        set(&mut payload.title, self.title);
        set(&mut payload.description, self.description);
        set(&mut payload.transcription, self.transcription);
        set(&mut payload.translation, self.translation);
        set(&mut payload.classification, self.classification);
        set(&mut payload.priority, self.priority);
        changed
    }
}
