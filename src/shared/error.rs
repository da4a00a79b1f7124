//! Shared Error Types
//!
//! This module defines the error taxonomy used by every layer of the sync engine.
//! Each variant maps to one failure class the scheduler treats differently.
//!
//! # Error Categories
//!
//! - `NetworkUnreachable` / `Timeout` - transport failures, retried automatically
//! - `Server` - 5xx or unparseable error bodies, retried automatically
//! - `Client` - 4xx validation failures, permanent until the user retries
//! - `LocalResourceMissing` - the durable media file is gone, permanent for that asset
//! - `Cancelled` - the pass was cancelled, never surfaced to the user
//! - `Storage` / `Serialization` - local persistence failures
//!
//! # Usage
//!
//! ```rust
//! use fieldsync::shared::error::SyncError;
//!
//! let error = SyncError::from_response(503, "<html>Service Unavailable</html>");
//! assert!(error.is_retryable());
//! assert!(!error.user_message().contains("<html>"));
//! ```
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the engine
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by the sync engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote service could not be reached (connect failure, DNS, reset)
    #[error("Network unreachable: {message}")]
    NetworkUnreachable {
        /// Transport-level detail, for logs only
        message: String,
    },

    /// A network call exceeded its timeout
    #[error("Timed out during {operation}")]
    Timeout {
        /// The remote operation that timed out
        operation: String,
    },

    /// 5xx response, or an error body the engine could not interpret
    #[error("Server error ({status:?}): {message}")]
    Server {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Message extracted from the response body
        message: String,
    },

    /// 4xx response, typically a validation failure
    #[error("Request rejected ({status}): {message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// The durable copy of a media file is missing at upload time
    #[error("Local file missing: {}", path.display())]
    LocalResourceMissing {
        /// Path that could not be read
        path: PathBuf,
    },

    /// The sync pass was cancelled
    #[error("Sync cancelled")]
    Cancelled,

    /// Local persistence failed
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// No queued item carries this local id
    #[error("Item not found: {local_id}")]
    ItemNotFound {
        /// The unknown local id
        local_id: String,
    },

    /// A state change the state machine does not allow
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a network unreachable error
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkUnreachable {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an item-not-found error
    pub fn item_not_found(local_id: impl Into<String>) -> Self {
        Self::ItemNotFound {
            local_id: local_id.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Classify a non-2xx HTTP response
    ///
    /// 5xx becomes `Server`, every other status becomes `Client`. The message is
    /// read from a JSON `message`, `error` or `detail` field when present.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = extract_error_message(body);
        if status >= 500 {
            Self::Server {
                status: Some(status),
                message: message.unwrap_or_else(|| format!("Server error ({})", status)),
            }
        } else {
            Self::Client {
                status,
                message: message.unwrap_or_else(|| format!("Request rejected ({})", status)),
            }
        }
    }

    /// Whether the scheduler may retry the failed operation on its own
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable { .. } | Self::Timeout { .. } | Self::Server { .. }
        )
    }

    /// Message recorded on items and assets and shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkUnreachable { .. } => {
                "Cannot reach the server. Sync will retry automatically.".to_string()
            }
            Self::Timeout { .. } => {
                "The server took too long to respond. Sync will retry automatically.".to_string()
            }
            Self::Server { message, .. } => {
                format!("{}. Sync will retry automatically.", message.trim_end_matches('.'))
            }
            Self::Client { message, .. } => message.clone(),
            Self::LocalResourceMissing { .. } => {
                "The media file is no longer available on this device.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Best-effort extraction of a structured error message from a response body
///
/// Returns `None` for empty bodies, HTML pages and stack traces so callers fall
/// back to a generic message.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["message", "error", "detail"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                    return Some(s.trim().to_string());
                }
                Some(nested @ serde_json::Value::Object(_)) => {
                    if let Some(serde_json::Value::String(s)) = nested.get("message") {
                        return Some(s.trim().to_string());
                    }
                }
                _ => {}
            }
        }
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    let looks_like_markup = lower.starts_with('<') || lower.contains("<html") || lower.contains("<!doctype");
    let looks_like_trace = lower.contains("traceback") || lower.contains("\n    at ") || lower.contains("stack");
    if looks_like_markup || looks_like_trace || trimmed.len() > 200 {
        return None;
    }

    Some(trimmed.to_string())
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}
