//! Connectivity snapshot reported by the platform.

use serde::{Deserialize, Serialize};

/// Transport behind the current connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Wifi,
    Cellular,
    Ethernet,
    Other,
    None,
}

/// Current connectivity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub connected: bool,
    pub kind: ConnectionKind,
}

impl NetworkState {
    pub fn wifi() -> Self {
        Self {
            connected: true,
            kind: ConnectionKind::Wifi,
        }
    }

    pub fn cellular() -> Self {
        Self {
            connected: true,
            kind: ConnectionKind::Cellular,
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            kind: ConnectionKind::None,
        }
    }

    /// Whether syncing is allowed under the WiFi-only policy
    pub fn allows_sync(&self, wifi_only: bool) -> bool {
        self.connected && (!wifi_only || matches!(self.kind, ConnectionKind::Wifi | ConnectionKind::Ethernet))
    }
}

/// Assume online until the platform says otherwise.
impl Default for NetworkState {
    fn default() -> Self {
        Self {
            connected: true,
            kind: ConnectionKind::Other,
        }
    }
}
