//! Connection handles and per-connection session state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use relayhub_protocol::OutboundMessage;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::error::RelayError;

/// Process-unique identifier of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out increasing connection ids.
#[derive(Debug, Default)]
pub struct ConnectionIds {
    next: AtomicU64,
}

impl ConnectionIds {
    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// A sender for outbound messages to one connection.
pub type ConnectionSender = mpsc::Sender<OutboundMessage>;

/// Back-reference to a connection, used for sending and for cleanup.
///
/// The transport owns the socket; the handle only owns the sending half of the
/// connection's outbound queue. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: ConnectionSender,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer drains.
    pub fn channel(id: ConnectionId, buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message for the peer, waiting for room in its queue.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), RelayError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| RelayError::ConnectionClosed(self.id))
    }

    /// Queue a message for the peer without waiting.
    ///
    /// Fails with `ConnectionBusy` when the peer is not draining its queue.
    pub fn try_deliver(&self, message: OutboundMessage) -> Result<(), RelayError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::ConnectionBusy(self.id),
            TrySendError::Closed(_) => RelayError::ConnectionClosed(self.id),
        })
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Authentication state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Controller, or an agent that has not authenticated yet.
    Open,
    /// Authenticated agent.
    Agent(String),
}

/// Everything the dispatcher knows about the connection a frame arrived on.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    state: SessionState,
}

impl Session {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            state: SessionState::Open,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// The agent id this connection authenticated as, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Agent(id) => Some(id),
            SessionState::Open => None,
        }
    }

    pub(crate) fn authenticate(&mut self, agent_id: String) {
        self.state = SessionState::Agent(agent_id);
    }
}
