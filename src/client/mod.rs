//! Sync Engine Client Module
//!
//! The offline-first engine that runs on the capture device.
//!
//! # Architecture
//!
//! - **`config`** - environment and TOML loading around [`AppConfig`](crate::shared::config::AppConfig)
//! - **`archive_client`** - remote archive contract and its HTTP implementation
//! - **`local_db`** - key-value persistence and the durable store
//! - **`offline`** - the item queue and retry policies
//! - **`sync`** - network monitor, upload pipeline, scheduler, progress, metrics
//! - **`settings`** - persisted user sync policy
//!
//! [`SyncEngine`] wires these together. It is constructed once by the
//! application and shared as an `Arc`.
//!
//! # Example
//!
//! ```rust,no_run
//! use fieldsync::client::{config::Config, SyncEngine};
//! use fieldsync::shared::item::{ItemPayload, NewItem, NewMedia};
//!
//! # async fn demo() -> fieldsync::shared::error::SyncResult<()> {
//! let engine = SyncEngine::open(Config::from_env()?).await?;
//! let mut events = engine.subscribe();
//!
//! let payload = ItemPayload { project_id: Some("p1".into()), ..Default::default() };
//! engine
//!     .add_item(NewItem::observation(payload, vec![NewMedia::photo("/tmp/capture.jpg")]))
//!     .await?;
//! engine.start_sync().await;
//!
//! while let Ok(event) = events.try_recv() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive_client;
pub mod config;
pub mod local_db;
pub mod offline;
pub mod settings;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use archive_client::{ArchiveApi, HttpArchiveClient};
pub use config::Config;
pub use local_db::{DurableStore, KeyValueStore, LocalDatabase};
pub use offline::SyncItemStore;
pub use settings::SettingsStore;
pub use sync::{SkipReason, SyncMetrics, SyncReport};

use crate::client::offline::retry::BackoffStrategy;
use crate::client::sync::{NetworkMonitor, NetworkTransition, ProgressTracker, SyncScheduler};
use crate::shared::error::SyncResult;
use crate::shared::event::SyncEvent;
use crate::shared::item::{ItemPatch, NewItem, SyncItem};
use crate::shared::network::NetworkState;
use crate::shared::progress::SyncProgress;
use crate::shared::settings::{SettingsPatch, SyncSettings};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, OnceCell, RwLock};

/// Offline-first sync engine
pub struct SyncEngine {
    config: Config,
    api: Arc<dyn ArchiveApi>,
    durable: Arc<DurableStore>,
    items: SyncItemStore,
    settings: SettingsStore,
    network: NetworkMonitor,
    progress: ProgressTracker,
    metrics: RwLock<SyncMetrics>,
    scheduler: SyncScheduler,
    initialized: OnceCell<()>,
    weak: Weak<SyncEngine>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("durable", &self.durable)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Build an engine over the given persistence and remote archive
    pub fn new(config: Config, kv: Arc<dyn KeyValueStore>, api: Arc<dyn ArchiveApi>) -> Arc<Self> {
        let app = config.app().clone();
        let durable = Arc::new(DurableStore::new(kv.clone(), app.media_dir()));

        Arc::new_cyclic(|weak| Self {
            api,
            items: SyncItemStore::new(durable.clone()),
            durable,
            settings: SettingsStore::new(kv),
            network: NetworkMonitor::default(),
            progress: ProgressTracker::new(),
            metrics: RwLock::new(SyncMetrics::new()),
            scheduler: SyncScheduler::new(
                BackoffStrategy::exponential(app.auto_retry_base, app.auto_retry_max_delay),
                app.max_auto_retries,
            ),
            initialized: OnceCell::new(),
            weak: weak.clone(),
            config,
        })
    }

    /// Open the on-disk database and the HTTP archive client, then initialize
    pub async fn open(config: Config) -> SyncResult<Arc<Self>> {
        let db = LocalDatabase::open(config.app().database_path()).await?;
        let api = HttpArchiveClient::new(config.clone())?;
        let engine = Self::new(config, Arc::new(db), Arc::new(api));
        engine.initialize().await;
        Ok(engine)
    }

    /// Load settings and the persisted queue; later calls do nothing
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                let settings = self.settings.load().await;
                let count = self.items.hydrate().await;
                tracing::info!(
                    "[SYNC] Engine ready with {} queued items (auto-sync {})",
                    count,
                    if settings.auto_sync { "on" } else { "off" }
                );
                if settings.auto_sync {
                    self.spawn_sync();
                }
            })
            .await;
    }

    /// Cancel the running pass and stop scheduling new ones
    pub fn dispose(&self) {
        self.scheduler.dispose();
        tracing::info!("[SYNC] Engine disposed");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a pass in the background
    pub fn spawn_sync(&self) {
        if self.scheduler.is_disposed() {
            return;
        }
        if let Some(engine) = self.weak.upgrade() {
            tokio::spawn(async move {
                engine.start_sync().await;
            });
        }
    }

    async fn maybe_auto_sync(&self) {
        let settings = self.settings.current().await;
        if settings.auto_sync && self.network.current().allows_sync(settings.wifi_only) {
            self.spawn_sync();
        }
    }

    // ---- Queue ----

    /// Queue a captured observation or task; returns its local id
    pub async fn add_item(&self, item: NewItem) -> SyncResult<String> {
        self.initialize().await;
        let local_id = self.items.add_item(item).await?;
        self.maybe_auto_sync().await;
        Ok(local_id)
    }

    pub async fn update_item(&self, local_id: &str, patch: ItemPatch) -> SyncResult<()> {
        self.initialize().await;
        self.items.update_item(local_id, patch).await
    }

    pub async fn remove_item(&self, local_id: &str) -> SyncResult<()> {
        self.initialize().await;
        self.items.remove_item(local_id).await
    }

    /// Re-queue an item; also resets the auto-retry backoff
    pub async fn retry_item(&self, local_id: &str) -> SyncResult<()> {
        self.initialize().await;
        self.items.retry_item(local_id).await?;
        self.scheduler.reset_retries();
        self.maybe_auto_sync().await;
        Ok(())
    }

    pub async fn clear_completed(&self) -> usize {
        self.initialize().await;
        self.items.clear_completed().await
    }

    pub async fn begin_transcription(&self, local_id: &str) -> SyncResult<()> {
        self.initialize().await;
        self.items.begin_transcription(local_id).await
    }

    pub async fn complete_transcription(
        &self,
        local_id: &str,
        transcription: String,
        translation: Option<String>,
    ) -> SyncResult<()> {
        self.initialize().await;
        self.items
            .complete_transcription(local_id, transcription, translation)
            .await
    }

    pub async fn fail_transcription(&self, local_id: &str, error: &str) -> SyncResult<()> {
        self.initialize().await;
        self.items.fail_transcription(local_id, error).await
    }

    /// Accept a reviewed task for upload
    pub async fn accept_task(&self, local_id: &str) -> SyncResult<()> {
        self.initialize().await;
        self.items.accept_task(local_id).await?;
        self.maybe_auto_sync().await;
        Ok(())
    }

    /// All items, newest first
    pub async fn get_items(&self) -> Vec<SyncItem> {
        self.initialize().await;
        self.items.get_items().await
    }

    pub async fn get_item(&self, local_id: &str) -> Option<SyncItem> {
        self.initialize().await;
        self.items.get(local_id).await
    }

    pub async fn get_progress(&self) -> SyncProgress {
        self.progress.snapshot().await
    }

    // ---- Settings and connectivity ----

    pub async fn settings(&self) -> SyncSettings {
        self.settings.current().await
    }

    pub async fn save_settings(&self, patch: SettingsPatch) -> SyncSettings {
        self.initialize().await;
        let before = self.settings.current().await;
        let after = self.settings.save(&patch).await;
        if after.auto_sync && !before.auto_sync {
            self.maybe_auto_sync().await;
        }
        after
    }

    pub fn network_state(&self) -> NetworkState {
        self.network.current()
    }

    /// Feed a platform connectivity notification
    pub async fn handle_network_change(&self, state: NetworkState) {
        let Some(transition) = self.network.update(state) else {
            return;
        };
        self.durable.emit(SyncEvent::NetworkChanged { network: state });

        match transition {
            NetworkTransition::Connected => {
                self.scheduler.reset_retries();
                self.maybe_auto_sync().await;
            }
            NetworkTransition::TransportChanged => self.maybe_auto_sync().await,
            NetworkTransition::Disconnected => {}
        }
    }

    // ---- Observation ----

    /// Subscribe to engine events; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.durable.subscribe()
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.scheduler.has_pending_retry()
    }
}
