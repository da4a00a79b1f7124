//! # Durable Store
//!
//! Persistence primitive under the item store:
//!
//! - the queue is serialized as one JSON array in the `sync_queue` slot
//! - media blobs are copied into `<data_dir>/media/` so they outlive the
//!   capture temp files
//! - events fan out over a `tokio::sync::broadcast` channel
//!
//! Persistence failures are logged and swallowed. The in-memory state stays
//! authoritative for the running process; only durability is lost.

use crate::client::local_db::{KeyValueStore, QUEUE_SLOT};
use crate::shared::event::SyncEvent;
use crate::shared::item::SyncItem;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct DurableStore {
    kv: Arc<dyn KeyValueStore>,
    media_dir: PathBuf,
    events: broadcast::Sender<SyncEvent>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("media_dir", &self.media_dir)
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl DurableStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, media_dir: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            kv,
            media_dir: media_dir.into(),
            events,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Load the persisted queue; an unreadable slot yields an empty queue
    pub async fn load(&self) -> Vec<SyncItem> {
        let raw = match self.kv.get(QUEUE_SLOT).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::error!("[STORE] Failed to read queue: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<SyncItem>>(&raw) {
            Ok(items) => {
                tracing::debug!("[STORE] Loaded {} queued items", items.len());
                items
            }
            Err(e) => {
                tracing::error!("[STORE] Discarding unreadable queue: {}", e);
                Vec::new()
            }
        }
    }

    /// Persist the whole queue
    pub async fn save(&self, items: &[SyncItem]) {
        let raw = match serde_json::to_string(items) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("[STORE] Failed to serialize queue: {}", e);
                return;
            }
        };

        if let Err(e) = self.kv.set(QUEUE_SLOT, &raw).await {
            tracing::error!("[STORE] Failed to persist queue of {} items: {}", items.len(), e);
        }
    }

    /// Subscribe to engine events; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Broadcast an event; returns the number of subscribers reached
    pub fn emit(&self, event: SyncEvent) -> usize {
        let event_type = event.event_type();
        match self.events.send(event) {
            Ok(subscriber_count) => {
                tracing::trace!("[STORE] {:?} sent to {} subscribers", event_type, subscriber_count);
                subscriber_count
            }
            Err(_) => {
                tracing::debug!("[STORE] No subscribers for {:?}", event_type);
                0
            }
        }
    }

    /// Whether a path names a file inside the media directory
    ///
    /// The prefix check is lexical, so anything after the media directory must
    /// be plain file names: `media/../photo.jpg` is not durable.
    pub fn is_durable(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.media_dir) else {
            return false;
        };
        let mut components = relative.components().peekable();
        components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
    }

    /// Copy a capture file into durable storage
    ///
    /// Paths already inside the media directory are returned unchanged. When
    /// the copy fails the original path is kept so capture can continue; the
    /// upload of that asset may fail later instead.
    pub async fn copy_to_durable_storage(&self, source: &Path, file_name: &str) -> PathBuf {
        if self.is_durable(source) {
            return source.to_path_buf();
        }

        let target = self.media_dir.join(file_name);
        if let Err(e) = tokio::fs::create_dir_all(&self.media_dir).await {
            tracing::error!(
                "[STORE] Cannot create media directory {}: {}",
                self.media_dir.display(),
                e
            );
            return source.to_path_buf();
        }

        match tokio::fs::copy(source, &target).await {
            Ok(bytes) => {
                tracing::debug!("[STORE] Copied {} ({} bytes) to {}", source.display(), bytes, target.display());
                target
            }
            Err(e) => {
                tracing::error!("[STORE] Failed to copy {} into durable storage: {}", source.display(), e);
                source.to_path_buf()
            }
        }
    }

    /// Delete a durable media file; missing files are ignored
    ///
    /// Files outside the media directory are never touched.
    pub async fn delete_file(&self, path: &Path) {
        if !self.is_durable(path) {
            tracing::debug!("[STORE] Not deleting {} outside durable storage", path.display());
            return;
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("[STORE] Deleted {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("[STORE] Failed to delete {}: {}", path.display(), e),
        }
    }
}
