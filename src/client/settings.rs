//! Persisted user sync policy.

use crate::client::local_db::{KeyValueStore, SETTINGS_SLOT};
use crate::shared::settings::{SettingsPatch, SyncSettings};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
    current: RwLock<SyncSettings>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            current: RwLock::new(SyncSettings::default()),
        }
    }

    /// Load persisted settings; unreadable values fall back to defaults
    pub async fn load(&self) -> SyncSettings {
        let settings = match self.kv.get(SETTINGS_SLOT).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::error!("[SETTINGS] Ignoring unreadable settings: {}", e);
                SyncSettings::default()
            }),
            Ok(None) => SyncSettings::default(),
            Err(e) => {
                tracing::error!("[SETTINGS] Failed to read settings: {}", e);
                SyncSettings::default()
            }
        };
        *self.current.write().await = settings.clone();
        settings
    }

    pub async fn current(&self) -> SyncSettings {
        self.current.read().await.clone()
    }

    /// Merge and persist a partial update; returns the new settings
    pub async fn save(&self, patch: &SettingsPatch) -> SyncSettings {
        let updated = {
            let mut current = self.current.write().await;
            *current = current.merged(patch);
            current.clone()
        };

        match serde_json::to_string(&updated) {
            Ok(raw) => {
                if let Err(e) = self.kv.set(SETTINGS_SLOT, &raw).await {
                    tracing::error!("[SETTINGS] Failed to persist settings: {}", e);
                }
            }
            Err(e) => tracing::error!("[SETTINGS] Failed to serialize settings: {}", e),
        }
        tracing::info!("[SETTINGS] Updated: {:?}", updated);
        updated
    }
}
