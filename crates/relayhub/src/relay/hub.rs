//! Hub owning the shared relay state.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use relayhub_protocol::OutboundMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::RelayConfig;

use super::connection::{ConnectionHandle, ConnectionIds, Session};
use super::pending::PendingRequests;
use super::registry::AgentRegistry;

/// Shared relay state: agent registry, pending request table, and settings.
///
/// All methods take `&self`; the hub is shared between connection tasks behind an
/// `Arc`. Sends to connections never happen while a table entry is borrowed.
pub struct RelayHub {
    pub(super) agents: AgentRegistry,
    pub(super) pending: PendingRequests,
    connection_ids: ConnectionIds,
    pub(super) config: RelayConfig,
}

impl RelayHub {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            agents: AgentRegistry::new(config.max_keylog_bytes),
            pending: PendingRequests::new(),
            connection_ids: ConnectionIds::default(),
            config,
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Allocate a connection.
    ///
    /// Returns the session the transport passes to [`RelayHub::dispatch`] and the
    /// receiver its writer drains.
    pub fn open_connection(&self) -> (Session, mpsc::Receiver<OutboundMessage>) {
        let (handle, rx) =
            ConnectionHandle::channel(self.connection_ids.next(), self.config.connection_buffer);
        debug!("Opened connection {}", handle.id());
        (Session::new(handle), rx)
    }

    /// Clean up after a closed connection.
    ///
    /// Unregisters the agent it authenticated as, fails the requests that were
    /// forwarded on it, and drops the requests it was waiting on.
    pub async fn disconnect(&self, session: &Session) {
        let connection = session.id();

        if let Some(agent_id) = session.agent_id() {
            self.agents.unregister_connection(agent_id, connection);
        }

        for request in self.pending.take_for_agent(connection) {
            let notice = OutboundMessage::Error {
                message: format!(
                    "Agent {} disconnected before responding",
                    request.original.agent
                ),
                request_id: Some(request.request_id.clone()),
            };
            if let Err(e) = request.requester.try_deliver(notice) {
                debug!(
                    "Could not notify requester of request {}: {}",
                    request.request_id, e
                );
            }
        }

        let abandoned = self.pending.take_for_requester(connection);
        if !abandoned.is_empty() {
            info!(
                "Dropped {} pending request(s) from closed connection {}",
                abandoned.len(),
                connection
            );
        }

        match session.agent_id() {
            Some(agent_id) => info!("Agent {} disconnected ({})", agent_id, connection),
            None => info!("Connection {} closed", connection),
        }
    }

    /// Expire pending requests older than the configured TTL.
    ///
    /// Returns the number of expired requests.
    pub async fn expire_pending(&self, now: Instant) -> usize {
        let Some(ttl) = self.config.pending_ttl() else {
            return 0;
        };

        let expired = self.pending.take_expired(ttl, now);
        for request in &expired {
            warn!(
                "Request {} ({} to agent {}) expired after {}s",
                request.request_id,
                request.original.kind,
                request.original.agent,
                ttl.as_secs()
            );
            if !self.config.notify_on_timeout {
                continue;
            }

            let notice = OutboundMessage::RequestTimeout {
                request_id: request.request_id.clone(),
                agent: request.original.agent.clone(),
                request_type: request.original.kind.to_string(),
                message: format!(
                    "Agent {} did not respond within {}s",
                    request.original.agent,
                    ttl.as_secs()
                ),
            };
            if let Err(e) = request.requester.try_deliver(notice) {
                debug!(
                    "Could not notify requester of expired request {}: {}",
                    request.request_id, e
                );
            }
        }
        expired.len()
    }

    /// Start the background sweep for expired requests.
    ///
    /// Returns `None` when expiry is disabled. The task holds a weak reference and
    /// stops once the hub is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let ttl = self.config.pending_ttl()?;
        let period = self.config.sweep_interval();
        let hub = Arc::downgrade(self);
        info!(
            "Expiring pending requests after {}s (sweep every {}s)",
            ttl.as_secs(),
            period.as_secs()
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.expire_pending(Instant::now()).await;
            }
        }))
    }

    /// Reply on the connection a message arrived on.
    pub(super) async fn reply(&self, session: &Session, message: OutboundMessage) {
        if let Err(e) = session.handle().send(message).await {
            debug!("Could not reply on {}: {}", session.id(), e);
        }
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
