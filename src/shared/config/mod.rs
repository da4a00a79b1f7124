//! Application configuration module
//!
//! Provides the engine configuration and its builder. Values that the user may
//! change at runtime live in [`SyncSettings`](crate::shared::settings::SyncSettings)
//! instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default remote archive URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Base URL of the remote archive API
    pub api_base_url: String,
    /// Bearer token sent with API calls
    pub api_token: Option<String>,
    /// Root of app-private durable storage
    pub data_dir: PathBuf,
    /// Timeout for metadata and registration calls
    pub request_timeout: Duration,
    /// Timeout for the reachability probe
    pub probe_timeout: Duration,
    /// Timeout for binary uploads
    pub upload_timeout: Duration,
    /// Cap for per-asset retry backoff
    pub max_asset_backoff: Duration,
    /// First auto-retry delay
    pub auto_retry_base: Duration,
    /// Cap for auto-retry delay
    pub auto_retry_max_delay: Duration,
    /// Auto-retries before the scheduler waits for a manual sync
    pub max_auto_retries: u32,
    /// Whether a 404 from the health route counts as reachable
    pub health_route_missing_is_reachable: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            data_dir: default_data_dir(),
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(300),
            max_asset_backoff: Duration::from_secs(30),
            auto_retry_base: Duration::from_secs(5),
            auto_retry_max_delay: Duration::from_secs(300),
            max_auto_retries: 8,
            health_route_missing_is_reachable: true,
        }
    }
}

/// Platform data directory, falling back to the temp dir
pub fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    path.push("fieldsync");
    path
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api_base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.api_base_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(self.api_base_url.clone()));
        }

        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("probe_timeout", self.probe_timeout),
            ("upload_timeout", self.upload_timeout),
            ("auto_retry_base", self.auto_retry_base),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(name, "must be greater than zero".to_string()));
            }
        }

        if self.auto_retry_max_delay < self.auto_retry_base {
            return Err(ConfigError::InvalidValue(
                "auto_retry_max_delay",
                "must not be smaller than auto_retry_base".to_string(),
            ));
        }

        Ok(())
    }

    /// Directory holding durable media copies
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("fieldsync.db")
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the API base URL
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_token(mut self, token: Option<String>) -> Self {
        self.config.api_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.config.upload_timeout = timeout;
        self
    }

    pub fn max_asset_backoff(mut self, cap: Duration) -> Self {
        self.config.max_asset_backoff = cap;
        self
    }

    /// Auto-retry base delay and cap
    pub fn auto_retry(mut self, base: Duration, max_delay: Duration) -> Self {
        self.config.auto_retry_base = base;
        self.config.auto_retry_max_delay = max_delay;
        self
    }

    pub fn max_auto_retries(mut self, attempts: u32) -> Self {
        self.config.max_auto_retries = attempts;
        self
    }

    pub fn health_route_missing_is_reachable(mut self, reachable: bool) -> Self {
        self.config.health_route_missing_is_reachable = reachable;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl From<ConfigError> for crate::shared::error::SyncError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
