//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::relay::RelayHub;

/// Shared state for HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay core shared by every connection.
    pub hub: Arc<RelayHub>,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
}

impl AppState {
    pub fn new(hub: Arc<RelayHub>, server: &ServerConfig) -> Self {
        Self {
            hub,
            ping_interval: server.ping_interval(),
        }
    }
}
