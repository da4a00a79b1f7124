//! # Sync Item Store
//!
//! In-memory map of queued items, indexed by local id and mirrored to the
//! [`DurableStore`] after every state change. This is the only writer of
//! [`SyncItem`]s: capture, edits, retries and every step of a sync pass go
//! through the methods below.
//!
//! ## Features
//!
//! - **Crash recovery**: `hydrate` normalizes in-flight states left behind by
//!   a process that died mid-pass
//! - **Durable media**: `add_item` copies capture files into app-private storage
//! - **Checked transitions**: every state change consults the transition table
//! - **Resumable retries**: completed assets are never uploaded twice
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::client::offline::SyncItemStore;
//! use fieldsync::shared::item::{ItemPayload, NewItem, NewMedia};
//!
//! # async fn demo(store: SyncItemStore) -> fieldsync::shared::error::SyncResult<()> {
//! let payload = ItemPayload { project_id: Some("p1".into()), ..Default::default() };
//! let local_id = store
//!     .add_item(NewItem::observation(payload, vec![NewMedia::photo("/tmp/capture.jpg")]))
//!     .await?;
//! store.retry_item(&local_id).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::DurableStore;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::event::SyncEvent;
use crate::shared::item::{ItemPatch, ItemPayload, MediaAsset, NewItem, SyncItem};
use crate::shared::state::{AssetState, ItemKind, ObservationState, Settlement, SyncState, TaskState};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Asset progress once the upload started
pub const PROGRESS_STARTED: u8 = 5;
/// Highest progress attributed to bytes sent
pub const PROGRESS_BYTES_CAP: u8 = 90;
/// Asset progress once the binary PUT succeeded
pub const PROGRESS_UPLOADED: u8 = 95;
/// Asset progress once the server registered the asset
pub const PROGRESS_REGISTERED: u8 = 100;

/// Queue of items awaiting convergence with the remote archive
#[derive(Debug)]
pub struct SyncItemStore {
    items: RwLock<HashMap<String, SyncItem>>,
    durable: Arc<DurableStore>,
    /// Serializes mutate-then-save so snapshots reach storage in order
    save_lock: Mutex<()>,
}

impl SyncItemStore {
    pub fn new(durable: Arc<DurableStore>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            durable,
            save_lock: Mutex::new(()),
        }
    }

    pub fn durable(&self) -> &Arc<DurableStore> {
        &self.durable
    }

    /// Load the persisted queue, normalizing interrupted items
    ///
    /// Returns the number of items loaded.
    pub async fn hydrate(&self) -> usize {
        let _guard = self.save_lock.lock().await;
        let loaded = self.durable.load().await;
        let mut recovered = 0;

        let snapshot = {
            let mut items = self.items.write().await;
            items.clear();
            for mut item in loaded {
                if item.recover_from_interruption() {
                    tracing::warn!(
                        "[STORE] Recovered interrupted item {} as {}",
                        item.local_id,
                        item.sync_state
                    );
                    recovered += 1;
                }
                items.insert(item.local_id.clone(), item);
            }
            Self::ordered(&items)
        };

        if recovered > 0 {
            self.durable.save(&snapshot).await;
        }
        tracing::info!("[STORE] Hydrated {} items ({} recovered)", snapshot.len(), recovered);
        snapshot.len()
    }

    fn ordered(items: &HashMap<String, SyncItem>) -> Vec<SyncItem> {
        let mut snapshot: Vec<SyncItem> = items.values().cloned().collect();
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.local_id.cmp(&b.local_id)));
        snapshot
    }

    async fn persist_locked(&self) {
        let snapshot = {
            let items = self.items.read().await;
            Self::ordered(&items)
        };
        self.durable.save(&snapshot).await;
    }

    /// Apply `f` to one item, persist, and announce a state change
    ///
    /// `f` must validate before it mutates; an error leaves the item as it was.
    async fn mutate<T>(
        &self,
        local_id: &str,
        f: impl FnOnce(&mut SyncItem) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let _guard = self.save_lock.lock().await;
        let (result, changed_to) = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(local_id)
                .ok_or_else(|| SyncError::item_not_found(local_id))?;
            let before = item.sync_state;
            let result = f(item)?;
            item.modified_at = Utc::now();
            let after = item.sync_state;
            (result, (before != after).then_some(after))
        };

        self.persist_locked().await;

        if let Some(state) = changed_to {
            self.durable.emit(SyncEvent::StateChanged {
                local_id: local_id.to_string(),
                state,
            });
        }
        Ok(result)
    }

    /// Queue a new item; media is copied into durable storage first
    pub async fn add_item(&self, new_item: NewItem) -> SyncResult<String> {
        let prefix = match new_item.kind {
            ItemKind::Observation => "obs",
            ItemKind::Task => "task",
        };
        let local_id = format!("{}-{}", prefix, Uuid::new_v4());

        let mut media = Vec::with_capacity(new_item.media.len());
        for new_media in new_item.media {
            let asset_id = Uuid::new_v4().to_string();
            let file_name = new_media
                .source_uri
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.bin", new_media.media_type.as_str()));
            let local_uri = self
                .durable
                .copy_to_durable_storage(&new_media.source_uri, &format!("{}_{}", asset_id, file_name))
                .await;
            let file_size = tokio::fs::metadata(&local_uri).await.map(|m| m.len()).unwrap_or(0);

            media.push(MediaAsset {
                id: asset_id,
                media_type: new_media.media_type,
                local_uri,
                remote_url: None,
                content_type: new_media.content_type,
                file_size,
                sync_state: AssetState::Pending,
                upload_progress: 0,
                retry_count: 0,
                last_error: None,
            });
        }

        let now = Utc::now();
        let item = SyncItem {
            local_id: local_id.clone(),
            payload: new_item.payload,
            media,
            sync_state: SyncState::initial(new_item.kind),
            remote_id: None,
            retry_count: 0,
            last_sync_error: None,
            last_sync_attempt: None,
            created_at: now,
            modified_at: now,
            sync_completed_at: None,
            metadata_dirty: false,
            requires_manual_retry: false,
        };
        let state = item.sync_state;

        {
            let _guard = self.save_lock.lock().await;
            self.items.write().await.insert(local_id.clone(), item);
            self.persist_locked().await;
        }

        tracing::info!("[STORE] Queued {}", local_id);
        self.durable.emit(SyncEvent::StateChanged {
            local_id: local_id.clone(),
            state,
        });
        Ok(local_id)
    }

    /// Edit an item's payload
    ///
    /// A real change to a settled item sends it back to the queue, and an item
    /// the server already knows is flagged for a metadata update.
    pub async fn update_item(&self, local_id: &str, patch: ItemPatch) -> SyncResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        self.mutate(local_id, |item| {
            let next = match item.sync_state {
                SyncState::Observation(ObservationState::Complete)
                | SyncState::Observation(ObservationState::Partial) => {
                    Some(SyncState::Observation(ObservationState::Pending))
                }
                SyncState::Task(TaskState::Complete) => Some(SyncState::Task(TaskState::Accepted)),
                _ => None,
            };

            if !patch.apply(&mut item.payload) {
                return Ok(());
            }
            if let Some(next) = next {
                item.sync_state.transition(next)?;
                item.sync_completed_at = None;
            }
            if item.remote_id.is_some() {
                item.metadata_dirty = true;
            }
            Ok(())
        })
        .await
    }

    /// Delete an item and the durable files no other item references
    pub async fn remove_item(&self, local_id: &str) -> SyncResult<()> {
        let orphans = {
            let _guard = self.save_lock.lock().await;
            let orphans = {
                let mut items = self.items.write().await;
                let removed = items
                    .remove(local_id)
                    .ok_or_else(|| SyncError::item_not_found(local_id))?;
                Self::unreferenced(&items, vec![removed])
            };
            self.persist_locked().await;
            orphans
        };

        for path in orphans {
            self.durable.delete_file(&path).await;
        }
        tracing::info!("[STORE] Removed {}", local_id);
        Ok(())
    }

    /// Remove every complete item; returns how many were removed
    pub async fn clear_completed(&self) -> usize {
        let (count, orphans) = {
            let _guard = self.save_lock.lock().await;
            let (count, orphans) = {
                let mut items = self.items.write().await;
                let complete: Vec<String> = items
                    .values()
                    .filter(|item| item.sync_state.is_complete())
                    .map(|item| item.local_id.clone())
                    .collect();
                let removed: Vec<SyncItem> = complete.iter().filter_map(|id| items.remove(id)).collect();
                (removed.len(), Self::unreferenced(&items, removed))
            };
            if count > 0 {
                self.persist_locked().await;
            }
            (count, orphans)
        };

        for path in orphans {
            self.durable.delete_file(&path).await;
        }
        if count > 0 {
            tracing::info!("[STORE] Cleared {} completed items", count);
        }
        count
    }

    fn unreferenced(remaining: &HashMap<String, SyncItem>, removed: Vec<SyncItem>) -> Vec<PathBuf> {
        let referenced: HashSet<&PathBuf> = remaining
            .values()
            .flat_map(|item| item.media.iter().map(|asset| &asset.local_uri))
            .collect();
        let mut orphans: Vec<PathBuf> = removed
            .into_iter()
            .flat_map(|item| item.media.into_iter().map(|asset| asset.local_uri))
            .filter(|path| !referenced.contains(path))
            .collect();
        orphans.sort();
        orphans.dedup();
        orphans
    }

    /// Re-queue an item, keeping completed assets
    pub async fn retry_item(&self, local_id: &str) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            if item.sync_state.is_in_flight() {
                return Err(SyncError::invalid_transition(item.sync_state, item.sync_state.resumable()));
            }
            item.sync_state.transition(item.sync_state.resumable())?;
            item.retry_count = 0;
            item.last_sync_error = None;
            item.requires_manual_retry = false;
            for asset in item.media.iter_mut().filter(|asset| asset.sync_state == AssetState::Failed) {
                asset.sync_state = AssetState::Pending;
                asset.upload_progress = 0;
                asset.retry_count = 0;
                asset.last_error = None;
            }
            Ok(())
        })
        .await
    }

    /// All items, newest first
    pub async fn get_items(&self) -> Vec<SyncItem> {
        let mut items = Self::ordered(&*self.items.read().await);
        items.reverse();
        items
    }

    pub async fn get(&self, local_id: &str) -> Option<SyncItem> {
        self.items.read().await.get(local_id).cloned()
    }

    /// Items a pass should process, oldest first
    pub async fn eligible(&self, max_retries: u32) -> Vec<SyncItem> {
        Self::ordered(&*self.items.read().await)
            .into_iter()
            .filter(|item| item.is_eligible(max_retries))
            .collect()
    }

    // ---- Voice task review flow ----

    /// `pending -> transcribing`
    pub async fn begin_transcription(&self, local_id: &str) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(SyncState::Task(TaskState::Transcribing))
        })
        .await
    }

    /// `transcribing -> review`, storing the transcription for human review
    pub async fn complete_transcription(
        &self,
        local_id: &str,
        transcription: String,
        translation: Option<String>,
    ) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(SyncState::Task(TaskState::Review))?;
            item.payload.transcription = Some(transcription);
            if translation.is_some() {
                item.payload.translation = translation;
            }
            item.last_sync_error = None;
            Ok(())
        })
        .await
    }

    /// `transcribing -> pending`, recording why transcription failed
    pub async fn fail_transcription(&self, local_id: &str, error: impl Into<String>) -> SyncResult<()> {
        let error = error.into();
        self.mutate(local_id, |item| {
            item.sync_state.transition(SyncState::Task(TaskState::Pending))?;
            item.last_sync_error = Some(error);
            Ok(())
        })
        .await
    }

    /// `review -> accepted`; the task becomes eligible for upload
    pub async fn accept_task(&self, local_id: &str) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(SyncState::Task(TaskState::Accepted))
        })
        .await
    }

    // ---- Sync pass steps ----

    /// Enter the upload state; returns the item as it is now
    pub async fn begin_processing(&self, local_id: &str) -> SyncResult<SyncItem> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(item.sync_state.upload_started())?;
            item.last_sync_attempt = Some(Utc::now());
            Ok(item.clone())
        })
        .await
    }

    /// The server accepted `sent` as this item's metadata
    ///
    /// Records `remote_id` if the item has none yet. The dirty flag survives if
    /// the payload was edited while the request was in flight.
    pub async fn metadata_acknowledged(&self, local_id: &str, remote_id: &str, sent: &ItemPayload) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(item.sync_state.media_phase())?;
            if item.remote_id.is_none() {
                item.remote_id = Some(remote_id.to_string());
            }
            item.metadata_dirty = item.payload != *sent;
            Ok(())
        })
        .await
    }

    /// Item-level failure before any asset was attempted
    pub async fn fail_item(&self, local_id: &str, error: &SyncError) -> SyncResult<SyncState> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(item.sync_state.failed())?;
            item.retry_count += 1;
            item.last_sync_error = Some(error.user_message());
            item.requires_manual_retry = !error.is_retryable();
            Ok(item.sync_state)
        })
        .await
    }

    fn with_asset<T>(
        item: &mut SyncItem,
        asset_id: &str,
        f: impl FnOnce(&mut MediaAsset) -> T,
    ) -> SyncResult<T> {
        let local_id = item.local_id.clone();
        item.asset_mut(asset_id)
            .map(f)
            .ok_or_else(|| SyncError::item_not_found(format!("{}/{}", local_id, asset_id)))
    }

    pub async fn asset_started(&self, local_id: &str, asset_id: &str) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            Self::with_asset(item, asset_id, |asset| {
                asset.sync_state = AssetState::Uploading;
                asset.upload_progress = asset.upload_progress.max(PROGRESS_STARTED);
            })
        })
        .await
    }

    /// Raise an uploading asset's progress; never lowers it
    ///
    /// Kept in memory only. Returns `true` when the value changed.
    pub async fn set_asset_progress(&self, local_id: &str, asset_id: &str, progress: u8) -> bool {
        let mut items = self.items.write().await;
        let Some(asset) = items.get_mut(local_id).and_then(|item| item.asset_mut(asset_id)) else {
            return false;
        };
        if asset.sync_state != AssetState::Uploading || progress <= asset.upload_progress {
            return false;
        }
        asset.upload_progress = progress.min(PROGRESS_REGISTERED);
        true
    }

    /// Count a failed attempt that will be retried
    pub async fn asset_retrying(&self, local_id: &str, asset_id: &str, error: &SyncError) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            Self::with_asset(item, asset_id, |asset| {
                asset.retry_count += 1;
                asset.last_error = Some(error.user_message());
            })
        })
        .await
    }

    pub async fn complete_asset(&self, local_id: &str, asset_id: &str, remote_url: String) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            Self::with_asset(item, asset_id, |asset| {
                asset.sync_state = AssetState::Complete;
                asset.remote_url = Some(remote_url);
                asset.upload_progress = PROGRESS_REGISTERED;
                asset.last_error = None;
            })
        })
        .await
    }

    pub async fn fail_asset(&self, local_id: &str, asset_id: &str, error: &SyncError) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            Self::with_asset(item, asset_id, |asset| {
                asset.sync_state = AssetState::Failed;
                asset.last_error = Some(error.user_message());
            })
        })
        .await
    }

    /// Settle an item once every pending asset was attempted
    ///
    /// `permanent` marks failures no automatic retry can fix. An edit made
    /// during the pass sends a fully uploaded item back to the queue.
    pub async fn finish_item(&self, local_id: &str, permanent: bool) -> SyncResult<(SyncState, Settlement)> {
        self.mutate(local_id, |item| {
            let settlement = item.settlement();
            let next = if settlement == Settlement::Complete && item.metadata_dirty {
                item.sync_state.resumable()
            } else {
                item.sync_state.settled(settlement)
            };
            item.sync_state.transition(next)?;

            match settlement {
                Settlement::Complete => {
                    item.last_sync_error = None;
                    item.requires_manual_retry = false;
                    if item.sync_state.is_complete() {
                        item.sync_completed_at = Some(Utc::now());
                    }
                }
                Settlement::Partial | Settlement::Failed => {
                    let failed = item.media.iter().filter(|asset| !asset.is_complete()).count();
                    let first_error = item
                        .media
                        .iter()
                        .find_map(|asset| asset.last_error.clone())
                        .unwrap_or_else(|| "Upload failed".to_string());
                    item.retry_count += 1;
                    item.requires_manual_retry = permanent;
                    item.last_sync_error = Some(if failed > 1 {
                        format!("{} of {} files failed to upload: {}", failed, item.media.len(), first_error)
                    } else {
                        first_error
                    });
                }
            }
            Ok((item.sync_state, settlement))
        })
        .await
    }

    /// A cancelled pass hands the item back to the queue
    pub async fn interrupt(&self, local_id: &str) -> SyncResult<()> {
        self.mutate(local_id, |item| {
            item.sync_state.transition(item.sync_state.resumable())?;
            for asset in &mut item.media {
                if asset.sync_state == AssetState::Uploading {
                    asset.sync_state = AssetState::Pending;
                    asset.upload_progress = 0;
                }
            }
            Ok(())
        })
        .await
    }

    /// Record a reachability failure without consuming retry budget
    pub async fn annotate_unreachable(&self, local_ids: &[String], message: &str) {
        let _guard = self.save_lock.lock().await;
        {
            let mut items = self.items.write().await;
            let now = Utc::now();
            for local_id in local_ids {
                if let Some(item) = items.get_mut(local_id) {
                    item.last_sync_error = Some(message.to_string());
                    item.last_sync_attempt = Some(now);
                }
            }
        }
        self.persist_locked().await;
    }
}
