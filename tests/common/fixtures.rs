//! Engine and capture-file fixtures

use fieldsync::client::{Config, SyncEngine};
use fieldsync::shared::{AppConfig, AppConfigBuilder, ItemPayload, NewItem, NewMedia};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for tests: data under `dir`, short per-asset backoff,
/// auto-retry timers that never fire during a test
pub fn test_config(dir: &Path, api_url: &str) -> AppConfigBuilder {
    AppConfig::builder()
        .api_base_url(api_url)
        .api_token(Some("test-token".to_string()))
        .data_dir(dir)
        .probe_timeout(Duration::from_secs(2))
        .request_timeout(Duration::from_secs(5))
        .max_asset_backoff(Duration::from_millis(20))
        .auto_retry(Duration::from_secs(60), Duration::from_secs(600))
}

/// Open an engine over the on-disk database in `dir`
pub async fn open_engine(builder: AppConfigBuilder) -> Arc<SyncEngine> {
    let config = Config::with_builder(builder).expect("valid test config");
    SyncEngine::open(config).await.expect("engine opens")
}

/// Write a capture file of `size` bytes outside the durable media directory
pub fn capture_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let captures = dir.join("captures");
    std::fs::create_dir_all(&captures).expect("create capture dir");
    let path = captures.join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).expect("write capture");
    path
}

/// Observation in project `p1` with one photo of `size` bytes per name
pub fn observation(dir: &Path, files: &[&str], size: usize) -> NewItem {
    NewItem::observation(
        ItemPayload {
            project_id: Some("p1".to_string()),
            title: Some("Fence line".to_string()),
            ..Default::default()
        },
        files
            .iter()
            .map(|name| NewMedia::photo(capture_file(dir, name, size)))
            .collect(),
    )
}
