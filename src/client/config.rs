use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the archive API URL
pub const ENV_API_URL: &str = "FIELDSYNC_API_URL";
/// Environment variable holding the API bearer token
pub const ENV_API_TOKEN: &str = "FIELDSYNC_API_TOKEN";
/// Environment variable overriding the durable storage root
pub const ENV_DATA_DIR: &str = "FIELDSYNC_DATA_DIR";

/// Engine configuration wrapper.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
}

/// On-disk TOML layout; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    api_url: Option<String>,
    api_token: Option<String>,
    data_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    upload_timeout_secs: Option<u64>,
    max_asset_backoff_secs: Option<u64>,
    auto_retry_base_secs: Option<u64>,
    auto_retry_max_delay_secs: Option<u64>,
    max_auto_retries: Option<u32>,
    health_route_missing_is_reachable: Option<bool>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self { app: builder.build()? })
    }

    /// Read `FIELDSYNC_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_builder(Self::env_overrides(AppConfig::builder())?)
    }

    /// Read a TOML file, then apply environment overrides
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw)?;
        let defaults = AppConfig::default();
        let secs = |value: Option<u64>, fallback: Duration| value.map(Duration::from_secs).unwrap_or(fallback);

        let mut builder = AppConfig::builder()
            .api_base_url(file.api_url.unwrap_or(defaults.api_base_url))
            .api_token(file.api_token)
            .data_dir(file.data_dir.unwrap_or(defaults.data_dir))
            .request_timeout(secs(file.request_timeout_secs, defaults.request_timeout))
            .probe_timeout(secs(file.probe_timeout_secs, defaults.probe_timeout))
            .upload_timeout(secs(file.upload_timeout_secs, defaults.upload_timeout))
            .max_asset_backoff(secs(file.max_asset_backoff_secs, defaults.max_asset_backoff))
            .auto_retry(
                secs(file.auto_retry_base_secs, defaults.auto_retry_base),
                secs(file.auto_retry_max_delay_secs, defaults.auto_retry_max_delay),
            )
            .max_auto_retries(file.max_auto_retries.unwrap_or(defaults.max_auto_retries))
            .health_route_missing_is_reachable(
                file.health_route_missing_is_reachable
                    .unwrap_or(defaults.health_route_missing_is_reachable),
            );
        builder = Self::env_overrides(builder)?;
        Self::with_builder(builder)
    }

    fn env_overrides(mut builder: AppConfigBuilder) -> Result<AppConfigBuilder, ConfigError> {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if url.trim().is_empty() {
                return Err(ConfigError::MissingValue(ENV_API_URL));
            }
            builder = builder.api_base_url(url);
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            builder = builder.api_token(Some(token));
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            builder = builder.data_dir(dir);
        }
        Ok(builder)
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.app.api_base_url, path.trim_start_matches('/'))
    }

    /// Get the bearer token
    pub fn token(&self) -> Option<&str> {
        self.app.api_token.as_deref()
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }
}
