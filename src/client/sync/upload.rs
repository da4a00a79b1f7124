//! # Upload Pipeline
//!
//! Drives one item through the remote archive:
//!
//! 1. create the remote item (or `PATCH` it when the payload was edited after
//!    creation)
//! 2. for every asset not yet complete, in list order: request a signed
//!    location, stream the binary, register the asset against the remote id
//!
//! Asset progress moves 5% on start, up to 90% with bytes sent, 95% once the
//! binary is stored and 100% once registered. Retryable asset failures are
//! retried in a bounded loop with exponential backoff; a terminal failure of
//! one asset never stops its siblings.

use crate::client::archive_client::{ArchiveApi, ItemMetadata, RegisterAssetRequest, UploadLocationRequest};
use crate::client::offline::queue::{
    SyncItemStore, PROGRESS_BYTES_CAP, PROGRESS_STARTED, PROGRESS_UPLOADED,
};
use crate::client::offline::retry::BackoffStrategy;
use crate::client::sync::sync_state::ProgressTracker;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::event::SyncEvent;
use crate::shared::item::{MediaAsset, SyncItem};
use crate::shared::progress::SyncProgress;
use crate::shared::settings::SyncSettings;
use crate::shared::state::Settlement;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// How one item ended its turn in the pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Metadata and every asset are on the server
    Synced { remote_id: String },
    /// Some assets uploaded, others failed
    Partial { error: String, retryable: bool },
    /// Metadata failed, or no asset uploaded
    Failed { error: String, retryable: bool },
    /// Edited during the pass; queued again for a metadata update
    Requeued,
    /// The pass was cancelled while this item was processed
    Cancelled,
    /// The item was removed or changed state before it could be processed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub local_id: String,
    pub kind: OutcomeKind,
    pub assets_uploaded: u32,
    pub bytes_uploaded: u64,
}

impl ItemOutcome {
    fn new(local_id: &str, kind: OutcomeKind) -> Self {
        Self {
            local_id: local_id.to_string(),
            kind,
            assets_uploaded: 0,
            bytes_uploaded: 0,
        }
    }
}

/// One-pass view over the engine's collaborators
pub struct UploadPipeline<'a> {
    api: &'a dyn ArchiveApi,
    items: &'a SyncItemStore,
    progress: &'a ProgressTracker,
    cancel: &'a AtomicBool,
    settings: SyncSettings,
    backoff: BackoffStrategy,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(
        api: &'a dyn ArchiveApi,
        items: &'a SyncItemStore,
        progress: &'a ProgressTracker,
        cancel: &'a AtomicBool,
        settings: SyncSettings,
        max_asset_backoff: Duration,
    ) -> Self {
        let backoff = BackoffStrategy::exponential(Duration::from_millis(settings.retry_delay_ms), max_asset_backoff);
        Self {
            api,
            items,
            progress,
            cancel,
            settings,
            backoff,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn publish(&self, progress: SyncProgress) {
        self.items.durable().emit(SyncEvent::ProgressUpdated { progress });
    }

    /// Process one eligible item
    pub async fn process(&self, local_id: &str) -> ItemOutcome {
        let item = match self.items.begin_processing(local_id).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("[UPLOAD] Skipping {}: {}", local_id, e);
                return ItemOutcome::new(local_id, OutcomeKind::Skipped);
            }
        };
        self.publish(self.progress.set_item(local_id).await);

        let remote_id = match self.sync_metadata(&item).await {
            Ok(remote_id) => remote_id,
            Err(SyncError::ItemNotFound { .. }) => return ItemOutcome::new(local_id, OutcomeKind::Skipped),
            Err(error) => return self.fail_metadata(&item, error).await,
        };

        let mut outcome = ItemOutcome::new(local_id, OutcomeKind::Skipped);
        let mut asset_errors = Vec::new();

        for asset in item.pending_assets() {
            if self.is_cancelled() {
                return self.cancelled(outcome).await;
            }

            match self.upload_asset(local_id, &remote_id, asset).await {
                Ok(bytes) => {
                    outcome.assets_uploaded += 1;
                    outcome.bytes_uploaded += bytes;
                }
                Err(SyncError::Cancelled) => return self.cancelled(outcome).await,
                Err(SyncError::ItemNotFound { .. }) => return outcome,
                Err(error) => asset_errors.push(error),
            }
        }

        let permanent = !asset_errors.is_empty() && asset_errors.iter().all(|e| !e.is_retryable());
        let (state, settlement) = match self.items.finish_item(local_id, permanent).await {
            Ok(settled) => settled,
            Err(e) => {
                tracing::warn!("[UPLOAD] Could not settle {}: {}", local_id, e);
                return outcome;
            }
        };

        let first_error = || {
            asset_errors
                .first()
                .map(SyncError::user_message)
                .unwrap_or_else(|| "Upload failed".to_string())
        };
        outcome.kind = match settlement {
            Settlement::Complete if state.is_complete() => OutcomeKind::Synced { remote_id },
            Settlement::Complete => OutcomeKind::Requeued,
            Settlement::Partial => OutcomeKind::Partial {
                error: first_error(),
                retryable: !permanent,
            },
            Settlement::Failed => OutcomeKind::Failed {
                error: first_error(),
                retryable: !permanent,
            },
        };
        outcome
    }

    async fn cancelled(&self, mut outcome: ItemOutcome) -> ItemOutcome {
        if let Err(e) = self.items.interrupt(&outcome.local_id).await {
            tracing::debug!("[UPLOAD] Nothing to interrupt for {}: {}", outcome.local_id, e);
        }
        tracing::info!("[UPLOAD] Cancelled while processing {}", outcome.local_id);
        outcome.kind = OutcomeKind::Cancelled;
        outcome
    }

    /// Create or update the remote item; returns the remote id
    async fn sync_metadata(&self, item: &SyncItem) -> SyncResult<String> {
        let metadata = ItemMetadata::from(item);
        let remote_id = match &item.remote_id {
            Some(remote_id) if item.metadata_dirty => {
                tracing::info!("[UPLOAD] Updating metadata of {} ({})", item.local_id, remote_id);
                self.api.update_item(remote_id, &metadata).await?;
                remote_id.clone()
            }
            Some(remote_id) => remote_id.clone(),
            None => {
                let remote_id = self.api.create_item(&metadata).await?;
                tracing::info!("[UPLOAD] Created {} as remote item {}", item.local_id, remote_id);
                remote_id
            }
        };

        self.items
            .metadata_acknowledged(&item.local_id, &remote_id, &item.payload)
            .await?;
        Ok(remote_id)
    }

    async fn fail_metadata(&self, item: &SyncItem, error: SyncError) -> ItemOutcome {
        let retryable = error.is_retryable();
        if retryable {
            tracing::warn!("[UPLOAD] Metadata for {} failed, will retry: {}", item.local_id, error);
        } else {
            tracing::error!("[UPLOAD] Metadata for {} rejected: {}", item.local_id, error);
        }

        if let Err(e) = self.items.fail_item(&item.local_id, &error).await {
            tracing::warn!("[UPLOAD] Could not record failure of {}: {}", item.local_id, e);
            return ItemOutcome::new(&item.local_id, OutcomeKind::Skipped);
        }
        // Assets of this item will not be attempted this pass
        self.publish(self.progress.skip_bytes(item.pending_bytes()).await);

        ItemOutcome::new(
            &item.local_id,
            OutcomeKind::Failed {
                error: error.user_message(),
                retryable,
            },
        )
    }

    /// Upload one asset with bounded retries; returns the bytes uploaded
    async fn upload_asset(&self, local_id: &str, remote_id: &str, asset: &MediaAsset) -> SyncResult<u64> {
        self.items.asset_started(local_id, &asset.id).await?;
        self.publish(self.progress.begin_asset(&asset.id, asset.file_size).await);
        tracing::debug!("[UPLOAD] Uploading asset {} of {}", asset.id, local_id);

        let mut attempt = 0;
        loop {
            match self.attempt_asset(local_id, remote_id, asset).await {
                Ok(remote_url) => {
                    self.items.complete_asset(local_id, &asset.id, remote_url).await?;
                    self.publish(self.progress.finish_asset(true).await);
                    return Ok(asset.file_size);
                }
                Err(error @ SyncError::ItemNotFound { .. }) => return Err(error),
                Err(error)
                    if error.is_retryable() && attempt < self.settings.max_retries && !self.is_cancelled() =>
                {
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "[UPLOAD] Asset {} attempt {} failed, retrying in {:?}: {}",
                        asset.id,
                        attempt,
                        delay,
                        error
                    );
                    self.items.asset_retrying(local_id, &asset.id, &error).await?;
                    tokio::time::sleep(delay).await;
                    if self.is_cancelled() {
                        return Err(SyncError::Cancelled);
                    }
                }
                Err(error) => {
                    if self.is_cancelled() && error.is_retryable() {
                        return Err(SyncError::Cancelled);
                    }
                    tracing::error!("[UPLOAD] Asset {} of {} failed: {}", asset.id, local_id, error);
                    self.items.fail_asset(local_id, &asset.id, &error).await?;
                    self.publish(self.progress.finish_asset(false).await);
                    return Err(error);
                }
            }
        }
    }

    /// One upload attempt: open, locate, stream, register
    async fn attempt_asset(&self, local_id: &str, remote_id: &str, asset: &MediaAsset) -> SyncResult<String> {
        let file = match tokio::fs::File::open(&asset.local_uri).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::LocalResourceMissing {
                    path: asset.local_uri.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let file_name = asset.file_name();
        let location = self
            .api
            .request_upload_location(&UploadLocationRequest {
                file_name: file_name.clone(),
                content_type: asset.content_type.clone(),
                asset_type: asset.media_type.as_str().to_string(),
            })
            .await?;

        let size = file.metadata().await?.len();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let upload = self.api.upload_binary(&location, &asset.content_type, file, size, tx);
        tokio::pin!(upload);

        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                Some(sent) = rx.recv() => self.report_bytes(local_id, asset, sent, size).await,
            }
        };
        while let Ok(sent) = rx.try_recv() {
            self.report_bytes(local_id, asset, sent, size).await;
        }
        result?;

        self.items.set_asset_progress(local_id, &asset.id, PROGRESS_UPLOADED).await;

        self.api
            .register_asset(
                remote_id,
                &RegisterAssetRequest {
                    asset_type: asset.media_type.as_str().to_string(),
                    object_path: location.object_path.clone(),
                    file_name,
                    mime_type: asset.content_type.clone(),
                },
            )
            .await
    }

    async fn report_bytes(&self, local_id: &str, asset: &MediaAsset, sent: u64, size: u64) {
        let span = u64::from(PROGRESS_BYTES_CAP - PROGRESS_STARTED);
        let pct = match size {
            0 => PROGRESS_BYTES_CAP,
            _ => PROGRESS_STARTED + (sent.min(size) * span / size) as u8,
        };
        self.items.set_asset_progress(local_id, &asset.id, pct).await;
        self.publish(self.progress.asset_bytes(sent).await);
    }
}
