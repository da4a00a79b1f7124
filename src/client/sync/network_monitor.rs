//! # Network Monitor
//!
//! Tracks connectivity reported by the platform and turns raw notifications
//! into edge-triggered transitions. Repeated notifications with the same state
//! are swallowed.
//!
//! ## Features
//!
//! - **Connectivity Detection**: connected/disconnected edges
//! - **Transport Awareness**: WiFi vs. cellular for the WiFi-only policy
//! - **Watchers**: `tokio::sync::watch` receivers always see the latest state

use crate::shared::network::NetworkState;
use tokio::sync::watch;

/// Edge produced by a connectivity update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTransition {
    /// Disconnected to connected
    Connected,
    /// Connected to disconnected
    Disconnected,
    /// Still connected, different transport
    TransportChanged,
}

#[derive(Debug)]
pub struct NetworkMonitor {
    state: watch::Sender<NetworkState>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}

impl NetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn current(&self) -> NetworkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    /// Apply a platform notification
    ///
    /// Returns the transition, or `None` if nothing changed.
    pub fn update(&self, next: NetworkState) -> Option<NetworkTransition> {
        let mut transition = None;
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            transition = Some(match (current.connected, next.connected) {
                (false, true) => NetworkTransition::Connected,
                (true, false) => NetworkTransition::Disconnected,
                _ => NetworkTransition::TransportChanged,
            });
            *current = next;
            true
        });

        if let Some(transition) = transition {
            tracing::info!("[NETWORK] {:?} ({:?})", transition, next.kind);
        }
        transition
    }
}
