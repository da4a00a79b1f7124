//! Remote Archive Client
//!
//! [`ArchiveApi`] abstracts the remote archive service the engine converges
//! with. [`HttpArchiveClient`] implements it over HTTP with `reqwest`:
//!
//! | Operation | Request |
//! |---|---|
//! | health probe | `GET {base}/health` |
//! | create item | `POST {base}/items` |
//! | update item | `PATCH {base}/items/{id}` |
//! | upload location | `POST {base}/uploads` |
//! | binary upload | `PUT {uploadUrl}` |
//! | register asset | `POST {base}/items/{id}/assets` |
//!
//! Every call has its own timeout: short for the probe, long for binaries.
//! Transport errors and non-2xx responses are classified into [`SyncError`].

use crate::client::config::Config;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::item::{ItemPayload, SyncItem};
use crate::shared::state::ItemKind;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Chunk size used to stream binaries and report byte progress
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Item metadata sent to `create-item` / `update-item`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub local_id: String,
    pub kind: ItemKind,
    #[serde(flatten)]
    pub payload: ItemPayload,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&SyncItem> for ItemMetadata {
    fn from(item: &SyncItem) -> Self {
        Self {
            local_id: item.local_id.clone(),
            kind: item.kind(),
            payload: item.payload.clone(),
            created_at: item.created_at,
        }
    }
}

/// Body of `request-upload-location`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadLocationRequest {
    pub file_name: String,
    pub content_type: String,
    pub asset_type: String,
}

/// One-time signed upload location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadLocation {
    pub upload_url: String,
    pub object_path: String,
}

/// Body of `register-asset`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAssetRequest {
    pub asset_type: String,
    pub object_path: String,
    pub file_name: String,
    pub mime_type: String,
}

/// Registration acknowledgement; `url` falls back to the object path
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct RegisterAssetResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Remote archive service contract
#[async_trait]
pub trait ArchiveApi: Send + Sync {
    /// Best-effort reachability probe
    async fn check_health(&self) -> SyncResult<()>;

    /// Create the remote item; returns its id
    async fn create_item(&self, metadata: &ItemMetadata) -> SyncResult<String>;

    /// Re-send metadata for an item edited after creation
    async fn update_item(&self, remote_id: &str, metadata: &ItemMetadata) -> SyncResult<()>;

    /// Ask for a one-time signed upload location
    async fn request_upload_location(&self, request: &UploadLocationRequest) -> SyncResult<UploadLocation>;

    /// Stream a file of `length` bytes to a signed location
    ///
    /// Cumulative bytes sent are reported on `progress` as the body is consumed.
    async fn upload_binary(
        &self,
        location: &UploadLocation,
        content_type: &str,
        file: File,
        length: u64,
        progress: mpsc::UnboundedSender<u64>,
    ) -> SyncResult<()>;

    /// Attach an uploaded object to the remote item; returns the asset URL
    async fn register_asset(&self, remote_id: &str, request: &RegisterAssetRequest) -> SyncResult<String>;
}

/// HTTP implementation of [`ArchiveApi`]
#[derive(Debug, Clone)]
pub struct HttpArchiveClient {
    config: Config,
    client: Client,
}

impl HttpArchiveClient {
    pub fn new(config: Config) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.app().probe_timeout)
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.token() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, operation: &str, timeout: Duration) -> SyncResult<Response> {
        let response = self
            .authorized(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport(e, operation))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = SyncError::from_response(status.as_u16(), &body);
        tracing::warn!("[ARCHIVE] {} failed with {}: {}", operation, status, error);
        Err(error)
    }
}

/// Map a transport failure to the error taxonomy
pub fn classify_transport(err: reqwest::Error, operation: &str) -> SyncError {
    if err.is_timeout() {
        SyncError::timeout(operation)
    } else if err.is_decode() {
        SyncError::Server {
            status: err.status().map(|s| s.as_u16()),
            message: "The server sent a response that could not be read".to_string(),
        }
    } else {
        SyncError::network(format!("{}: {}", operation, err))
    }
}

/// Read the created item id, accepting either a JSON string or number
fn parse_remote_id(value: &serde_json::Value) -> Option<String> {
    match value.get("id")? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ArchiveApi for HttpArchiveClient {
    async fn check_health(&self) -> SyncResult<()> {
        let url = self.config.api_url("health");
        let result = self
            .authorized(self.client.get(&url))
            .timeout(self.config.app().probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                if self.config.app().health_route_missing_is_reachable {
                    tracing::debug!("[ARCHIVE] Health route missing, treating host as reachable");
                    Ok(())
                } else {
                    Err(SyncError::network("health route missing, reachability unknown"))
                }
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(SyncError::from_response(status, &body))
            }
            Err(e) => Err(classify_transport(e, "health check")),
        }
    }

    async fn create_item(&self, metadata: &ItemMetadata) -> SyncResult<String> {
        let url = self.config.api_url("items");
        let response = self
            .send(self.client.post(&url).json(metadata), "create item", self.config.app().request_timeout)
            .await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_transport(e, "create item"))?;
        parse_remote_id(&body).ok_or_else(|| SyncError::Server {
            status: None,
            message: "The server did not return an item id".to_string(),
        })
    }

    async fn update_item(&self, remote_id: &str, metadata: &ItemMetadata) -> SyncResult<()> {
        let url = self.config.api_url(&format!("items/{}", remote_id));
        self.send(self.client.patch(&url).json(metadata), "update item", self.config.app().request_timeout)
            .await?;
        Ok(())
    }

    async fn request_upload_location(&self, request: &UploadLocationRequest) -> SyncResult<UploadLocation> {
        let url = self.config.api_url("uploads");
        let response = self
            .send(
                self.client.post(&url).json(request),
                "request upload location",
                self.config.app().request_timeout,
            )
            .await?;
        response
            .json::<UploadLocation>()
            .await
            .map_err(|e| classify_transport(e, "request upload location"))
    }

    async fn upload_binary(
        &self,
        location: &UploadLocation,
        content_type: &str,
        file: File,
        length: u64,
        progress: mpsc::UnboundedSender<u64>,
    ) -> SyncResult<()> {
        let mut sent = 0u64;
        let body = ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                sent += chunk.len() as u64;
                let _ = progress.send(sent);
            }
        });

        // Signed locations are not on the API host; no bearer token.
        let response = self
            .client
            .put(&location.upload_url)
            .header("Content-Type", content_type)
            .header("Content-Length", length)
            .body(reqwest::Body::wrap_stream(body))
            .timeout(self.config.app().upload_timeout)
            .send()
            .await
            .map_err(|e| classify_transport(e, "upload"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::from_response(status, &body));
        }
        Ok(())
    }

    async fn register_asset(&self, remote_id: &str, request: &RegisterAssetRequest) -> SyncResult<String> {
        let url = self.config.api_url(&format!("items/{}/assets", remote_id));
        let response = self
            .send(self.client.post(&url).json(request), "register asset", self.config.app().request_timeout)
            .await?;

        let text = response.text().await.unwrap_or_default();
        let ack: RegisterAssetResponse = serde_json::from_str(&text).unwrap_or_default();
        Ok(ack.url.unwrap_or_else(|| request.object_path.clone()))
    }
}
