//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use relayhub::api;
use relayhub::config::{RelayConfig, ServerConfig};
use relayhub::relay::{RelayHub, Session};
use relayhub_protocol::OutboundMessage;
use serde_json::Value;
use tokio::sync::mpsc;

/// A connection driven directly against the hub, without a socket.
pub struct TestConnection {
    pub session: Session,
    pub rx: mpsc::Receiver<OutboundMessage>,
}

impl TestConnection {
    pub fn open(hub: &RelayHub) -> Self {
        let (session, rx) = hub.open_connection();
        Self { session, rx }
    }

    /// Send one frame through the dispatcher.
    pub async fn send(&mut self, hub: &RelayHub, frame: Value) {
        hub.dispatch(&mut self.session, &frame.to_string()).await;
    }

    /// Everything queued for this connection so far.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}

pub fn test_hub() -> RelayHub {
    RelayHub::new(RelayConfig::default())
}

/// Open a connection and authenticate it as `agent_id`.
pub async fn connect_agent(hub: &RelayHub, agent_id: &str) -> TestConnection {
    let mut conn = TestConnection::open(hub);
    conn.send(
        hub,
        serde_json::json!({"type": "agent-auth", "data": agent_id}),
    )
    .await;
    let replies = conn.drain();
    assert!(
        matches!(replies.as_slice(), [OutboundMessage::Success { .. }]),
        "agent-auth for {agent_id} failed: {replies:?}"
    );
    conn
}

/// The correlation id of a request forwarded to an agent.
pub fn forwarded_request_id(message: &OutboundMessage) -> String {
    match message {
        OutboundMessage::Cmd { request_id, .. }
        | OutboundMessage::Fs { request_id, .. }
        | OutboundMessage::Readfile { request_id, .. } => request_id.clone(),
        other => panic!("not a forwarded request: {other:?}"),
    }
}

/// Create a test application around a fresh hub.
pub fn test_app() -> (Router, Arc<RelayHub>) {
    let hub = Arc::new(test_hub());
    let state = api::AppState::new(hub.clone(), &ServerConfig::default());
    (api::create_router(state), hub)
}
