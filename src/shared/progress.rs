//! Sync progress snapshot published to subscribers. Recomputed every pass,
//! never persisted.

use serde::{Deserialize, Serialize};

/// Aggregate progress of the current pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    /// Whether a pass is running
    pub is_active: bool,
    /// Item currently being processed
    pub current_item_id: Option<String>,
    /// Asset currently being uploaded
    pub current_asset_id: Option<String>,
    pub files_uploaded: u32,
    pub files_total: u32,
    /// Bytes of fully uploaded assets, plus the in-flight asset's sent bytes
    pub bytes_uploaded: u64,
    pub bytes_total: u64,
    /// Byte-weighted percentage across all items of the pass, 0 to 100
    pub overall_progress: u8,
}

impl SyncProgress {
    /// Byte-weighted percentage for the given counters
    pub fn percentage(bytes_uploaded: u64, bytes_total: u64) -> u8 {
        if bytes_total == 0 {
            return 0;
        }
        let pct = bytes_uploaded.min(bytes_total).saturating_mul(100) / bytes_total;
        pct as u8
    }
}
