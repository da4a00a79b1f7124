//! Test doubles and fixtures shared by the unit tests.

use crate::client::archive_client::{
    ArchiveApi, ItemMetadata, RegisterAssetRequest, UploadLocation, UploadLocationRequest, UPLOAD_CHUNK_SIZE,
};
use crate::client::local_db::{DurableStore, LocalDatabase};
use crate::client::config::Config;
use crate::client::offline::SyncItemStore;
use crate::client::SyncEngine;
use crate::shared::config::AppConfig;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::item::{ItemPayload, NewItem, NewMedia};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Scripted response of one fake call
#[derive(Debug, Clone)]
pub enum Step {
    Ok,
    Fail(SyncError),
}

#[derive(Debug, Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl Script {
    fn next(&self) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Ok) | None => Ok(()),
        }
    }

    fn push(&self, steps: impl IntoIterator<Item = Step>) {
        self.steps.lock().unwrap().extend(steps);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// In-process [`ArchiveApi`] whose calls succeed unless scripted otherwise
#[derive(Debug, Default)]
pub struct FakeArchive {
    health: Script,
    create: Script,
    update: Script,
    locate: Script,
    upload: Script,
    register: Script,
    upload_delay: Mutex<Option<Duration>>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_health(&self, steps: impl IntoIterator<Item = Step>) {
        self.health.push(steps);
    }

    pub fn script_create(&self, steps: impl IntoIterator<Item = Step>) {
        self.create.push(steps);
    }

    pub fn script_upload(&self, steps: impl IntoIterator<Item = Step>) {
        self.upload.push(steps);
    }

    pub fn script_register(&self, steps: impl IntoIterator<Item = Step>) {
        self.register.push(steps);
    }

    /// Make every binary upload take at least `delay`
    pub fn slow_uploads(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    pub fn health_calls(&self) -> usize {
        self.health.calls()
    }

    pub fn create_calls(&self) -> usize {
        self.create.calls()
    }

    pub fn update_calls(&self) -> usize {
        self.update.calls()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload.calls()
    }

    pub fn register_calls(&self) -> usize {
        self.register.calls()
    }
}

#[async_trait]
impl ArchiveApi for FakeArchive {
    async fn check_health(&self) -> SyncResult<()> {
        self.health.next()
    }

    async fn create_item(&self, _metadata: &ItemMetadata) -> SyncResult<String> {
        self.create.next().map(|_| "42".to_string())
    }

    async fn update_item(&self, _remote_id: &str, _metadata: &ItemMetadata) -> SyncResult<()> {
        self.update.next()
    }

    async fn request_upload_location(&self, request: &UploadLocationRequest) -> SyncResult<UploadLocation> {
        self.locate.next()?;
        Ok(UploadLocation {
            upload_url: format!("https://storage.test/{}", request.file_name),
            object_path: format!("uploads/{}", request.file_name),
        })
    }

    async fn upload_binary(
        &self,
        _location: &UploadLocation,
        _content_type: &str,
        file: File,
        _length: u64,
        progress: mpsc::UnboundedSender<u64>,
    ) -> SyncResult<()> {
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.upload.next()?;
        let mut sent = 0u64;
        let mut chunks = ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE);
        while let Some(chunk) = chunks.next().await {
            sent += chunk?.len() as u64;
            let _ = progress.send(sent);
        }
        Ok(())
    }

    async fn register_asset(&self, _remote_id: &str, request: &RegisterAssetRequest) -> SyncResult<String> {
        self.register.next()?;
        Ok(format!("https://cdn.test/{}", request.object_path))
    }
}

/// Item store over an in-memory database, media under `dir/media`
pub async fn item_store(dir: &Path) -> SyncItemStore {
    SyncItemStore::new(durable_store(dir).await)
}

pub async fn durable_store(dir: &Path) -> Arc<DurableStore> {
    let db = LocalDatabase::in_memory().await.unwrap();
    Arc::new(DurableStore::new(Arc::new(db), dir.join("media")))
}

/// Write a capture file of `size` bytes
pub fn capture_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0xAB; size]).unwrap();
    path
}

/// Observation in project `p1` with one 1 KiB photo per file name
pub fn observation_with_files(dir: &Path, files: &[&str]) -> NewItem {
    NewItem::observation(
        ItemPayload {
            project_id: Some("p1".to_string()),
            ..Default::default()
        },
        files
            .iter()
            .map(|name| NewMedia::photo(capture_file(dir, name, 1024)))
            .collect(),
    )
}

/// Initialized engine over an in-memory database, data under `dir`
///
/// Auto-retry timers are long enough that they never fire inside a test.
pub async fn engine(dir: &Path, api: Arc<FakeArchive>) -> Arc<SyncEngine> {
    let config = Config::with_builder(
        AppConfig::builder()
            .data_dir(dir)
            .max_asset_backoff(Duration::from_millis(10))
            .auto_retry(Duration::from_secs(60), Duration::from_secs(600)),
    )
    .unwrap();
    let db = LocalDatabase::in_memory().await.unwrap();
    let engine = SyncEngine::new(config, Arc::new(db), api);
    engine.initialize().await;
    engine
}
