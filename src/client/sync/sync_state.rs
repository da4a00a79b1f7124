//! # Sync Progress Tracking
//!
//! Aggregates byte-weighted progress for the running pass. Every asset
//! contributes its `file_size` to the pass total; an asset that ends (uploaded
//! or failed) counts as settled so the overall percentage never moves back.

use crate::shared::progress::SyncProgress;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Counters {
    progress: SyncProgress,
    /// Bytes of assets that reached a final state this pass
    settled_bytes: u64,
    /// Bytes of assets that uploaded this pass
    uploaded_bytes: u64,
    /// Size of the asset in flight
    current_size: u64,
}

impl Counters {
    fn recompute(&mut self, in_flight: u64) {
        self.progress.bytes_uploaded = self.uploaded_bytes + in_flight;
        let overall = SyncProgress::percentage(self.settled_bytes + in_flight, self.progress.bytes_total);
        self.progress.overall_progress = self.progress.overall_progress.max(overall);
    }
}

/// Progress of the current pass
#[derive(Debug, Default)]
pub struct ProgressTracker {
    counters: RwLock<Counters>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SyncProgress {
        self.counters.read().await.progress.clone()
    }

    /// Reset for a new pass over `files_total` assets of `bytes_total` bytes
    pub async fn begin(&self, files_total: u32, bytes_total: u64) -> SyncProgress {
        let mut counters = self.counters.write().await;
        *counters = Counters {
            progress: SyncProgress {
                is_active: true,
                files_total,
                bytes_total,
                ..Default::default()
            },
            ..Default::default()
        };
        counters.progress.clone()
    }

    pub async fn set_item(&self, local_id: &str) -> SyncProgress {
        let mut counters = self.counters.write().await;
        counters.progress.current_item_id = Some(local_id.to_string());
        counters.progress.current_asset_id = None;
        counters.progress.clone()
    }

    pub async fn begin_asset(&self, asset_id: &str, file_size: u64) -> SyncProgress {
        let mut counters = self.counters.write().await;
        counters.progress.current_asset_id = Some(asset_id.to_string());
        counters.current_size = file_size;
        counters.recompute(0);
        counters.progress.clone()
    }

    /// Bytes of the current asset sent so far
    pub async fn asset_bytes(&self, sent: u64) -> SyncProgress {
        let mut counters = self.counters.write().await;
        let in_flight = sent.min(counters.current_size);
        counters.recompute(in_flight);
        counters.progress.clone()
    }

    /// The current asset reached a final state
    pub async fn finish_asset(&self, uploaded: bool) -> SyncProgress {
        let mut counters = self.counters.write().await;
        let size = std::mem::take(&mut counters.current_size);
        counters.settled_bytes += size;
        if uploaded {
            counters.uploaded_bytes += size;
            counters.progress.files_uploaded += 1;
        }
        counters.progress.current_asset_id = None;
        counters.recompute(0);
        counters.progress.clone()
    }

    /// Assets skipped without an attempt still count as settled
    pub async fn skip_bytes(&self, bytes: u64) -> SyncProgress {
        let mut counters = self.counters.write().await;
        counters.settled_bytes += bytes;
        counters.recompute(0);
        counters.progress.clone()
    }

    /// End the pass; a pass that ran to completion reports 100%
    pub async fn finish(&self, ran_to_completion: bool) -> SyncProgress {
        let mut counters = self.counters.write().await;
        counters.progress.is_active = false;
        counters.progress.current_item_id = None;
        counters.progress.current_asset_id = None;
        if ran_to_completion {
            counters.progress.overall_progress = 100;
        }
        counters.progress.clone()
    }
}
