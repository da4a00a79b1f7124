//! User-facing sync policy, persisted across restarts.

use serde::{Deserialize, Serialize};

/// Sync policy
///
/// Defaults favor availability: manual sync, any network, generous retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Only sync over WiFi
    pub wifi_only: bool,
    /// Sync on capture, on reconnect and on backlog
    pub auto_sync: bool,
    /// Item retry budget, and per-asset immediate retry ceiling
    pub max_retries: u32,
    /// Base delay for per-asset backoff
    pub retry_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            wifi_only: false,
            auto_sync: false,
            max_retries: 10,
            retry_delay_ms: 1000,
        }
    }
}

/// Partial settings update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub wifi_only: Option<bool>,
    pub auto_sync: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl SyncSettings {
    /// Merge a partial update
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            wifi_only: patch.wifi_only.unwrap_or(self.wifi_only),
            auto_sync: patch.auto_sync.unwrap_or(self.auto_sync),
            max_retries: patch.max_retries.unwrap_or(self.max_retries),
            retry_delay_ms: patch.retry_delay_ms.unwrap_or(self.retry_delay_ms),
        }
    }
}
