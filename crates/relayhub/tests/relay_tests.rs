//! Relay behavior driven through the dispatcher with in-memory connections.

use std::sync::Arc;
use std::time::Duration;

use relayhub::config::RelayConfig;
use relayhub::relay::{
    ConnectionHandle, ConnectionIds, OriginalRequest, PendingRequest, PendingRequests, RelayError,
    RelayHub,
};
use relayhub_protocol::{MessageKind, OutboundMessage};
use serde_json::json;

mod common;
use common::{TestConnection, connect_agent, forwarded_request_id, test_hub};

#[tokio::test]
async fn test_duplicate_registration_keeps_first_connection() {
    let hub = test_hub();
    let first = connect_agent(&hub, "A").await;
    let mut second = TestConnection::open(&hub);

    second
        .send(&hub, json!({"type": "agent-auth", "data": "A"}))
        .await;

    assert_eq!(
        second.drain(),
        vec![OutboundMessage::error("Agent already connected")]
    );
    assert_eq!(
        hub.agents().lookup("A").map(|h| h.id()),
        Some(first.session.id())
    );
}

#[test]
fn test_take_is_exactly_once_under_race() {
    let ids = ConnectionIds::default();
    let (requester, _rx) = ConnectionHandle::channel(ids.next(), 4);
    let agent = ids.next();
    let table = Arc::new(PendingRequests::new());

    for round in 0..100 {
        let request_id = format!("race-{round}");
        table
            .create(PendingRequest::new(
                request_id.clone(),
                requester.clone(),
                OriginalRequest {
                    agent: "A".to_string(),
                    kind: MessageKind::Cmd,
                    data: json!("dir"),
                },
                agent,
            ))
            .unwrap();

        let hits: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let table = Arc::clone(&table);
                    let request_id = request_id.clone();
                    scope.spawn(move || table.take(&request_id).is_some())
                })
                .collect();
            workers
                .into_iter()
                .map(|w| usize::from(w.join().unwrap()))
                .sum()
        });
        assert_eq!(hits, 1, "round {round}");
    }
    assert!(table.is_empty());
}

#[test]
fn test_create_rejects_live_id() {
    let ids = ConnectionIds::default();
    let (requester, _rx) = ConnectionHandle::channel(ids.next(), 4);
    let table = PendingRequests::new();
    let entry = || {
        PendingRequest::new(
            "r".to_string(),
            requester.clone(),
            OriginalRequest {
                agent: "A".to_string(),
                kind: MessageKind::Fs,
                data: json!("."),
            },
            requester.id(),
        )
    };

    table.create(entry()).unwrap();
    assert!(matches!(
        table.create(entry()),
        Err(RelayError::DuplicateRequestId(_))
    ));
}

#[tokio::test]
async fn test_cmd_for_unregistered_agent_creates_no_entry() {
    let hub = test_hub();
    let mut controller = TestConnection::open(&hub);

    controller
        .send(&hub, json!({"type": "cmd", "agent": "A", "data": "dir"}))
        .await;

    assert_eq!(
        controller.drain(),
        vec![OutboundMessage::error("Agent A not connected")]
    );
    assert_eq!(hub.pending().len(), 0);
}

#[tokio::test]
async fn test_cmd_round_trip() {
    let hub = test_hub();
    let mut agent = connect_agent(&hub, "A").await;
    let mut controller = TestConnection::open(&hub);

    controller
        .send(&hub, json!({"type": "cmd", "agent": "A", "data": "dir"}))
        .await;

    let forwarded = agent.drain();
    assert_eq!(forwarded.len(), 1);
    let request_id = forwarded_request_id(&forwarded[0]);
    assert_eq!(
        forwarded[0],
        OutboundMessage::Cmd {
            request_id: request_id.clone(),
            data: json!("dir"),
        }
    );
    assert_eq!(hub.pending().len(), 1);

    agent
        .send(
            &hub,
            json!({"type": "cmd_response", "request_id": request_id, "data": "out"}),
        )
        .await;

    assert_eq!(
        controller.drain(),
        vec![OutboundMessage::CmdResponse {
            agent: "A".to_string(),
            data: json!("out"),
            original_command: json!("dir"),
        }]
    );
    assert!(agent.drain().is_empty());
    assert!(hub.pending().is_empty());

    // A late duplicate has nowhere to go.
    agent
        .send(
            &hub,
            json!({"type": "cmd_response", "request_id": request_id, "data": "again"}),
        )
        .await;
    assert!(controller.drain().is_empty());
    assert!(agent.drain().is_empty());
}

#[tokio::test]
async fn test_readfile_responses_reach_their_own_requesters() {
    let hub = test_hub();
    let mut agent = connect_agent(&hub, "A").await;
    let mut alice = TestConnection::open(&hub);
    let mut bob = TestConnection::open(&hub);

    alice
        .send(&hub, json!({"type": "readfile", "agent": "A", "data": "a.txt"}))
        .await;
    bob.send(&hub, json!({"type": "readfile", "agent": "A", "data": "b.txt"}))
        .await;

    let forwarded = agent.drain();
    assert_eq!(forwarded.len(), 2);
    let alice_id = forwarded_request_id(&forwarded[0]);
    let bob_id = forwarded_request_id(&forwarded[1]);
    assert_ne!(alice_id, bob_id);

    // Answer out of order.
    agent
        .send(
            &hub,
            json!({"type": "readfile_response", "request_id": bob_id, "data": "B"}),
        )
        .await;
    agent
        .send(
            &hub,
            json!({"type": "readfile_response", "request_id": alice_id, "data": "A"}),
        )
        .await;

    assert_eq!(
        alice.drain(),
        vec![OutboundMessage::ReadfileResponse {
            agent: "A".to_string(),
            data: json!("A"),
            original_path: json!("a.txt"),
        }]
    );
    assert_eq!(
        bob.drain(),
        vec![OutboundMessage::ReadfileResponse {
            agent: "A".to_string(),
            data: json!("B"),
            original_path: json!("b.txt"),
        }]
    );
}

/// Send a `cmd` to agent `A` and return the request id it was forwarded with.
async fn forward_cmd(
    hub: &RelayHub,
    controller: &mut TestConnection,
    agent: &mut TestConnection,
    command: &str,
) -> String {
    controller
        .send(hub, json!({"type": "cmd", "agent": "A", "data": command}))
        .await;
    let forwarded = agent.drain();
    assert_eq!(forwarded.len(), 1);
    forwarded_request_id(&forwarded[0])
}

#[tokio::test]
async fn test_stalled_requester_does_not_block_other_responses() {
    let hub = RelayHub::new(RelayConfig {
        connection_buffer: 1,
        ..RelayConfig::default()
    });
    let mut agent = connect_agent(&hub, "A").await;
    let mut stalled = TestConnection::open(&hub);
    let mut fast = TestConnection::open(&hub);

    let request_ids = [
        forward_cmd(&hub, &mut stalled, &mut agent, "one").await,
        forward_cmd(&hub, &mut stalled, &mut agent, "two").await,
        forward_cmd(&hub, &mut fast, &mut agent, "three").await,
    ];

    // The stalled controller never reads, so its queue fills after one reply.
    for request_id in &request_ids {
        let answer = json!({"type": "cmd_response", "request_id": request_id, "data": "ok"});
        tokio::time::timeout(Duration::from_secs(2), agent.send(&hub, answer))
            .await
            .expect("agent reader blocked on a full requester queue");
    }

    assert_eq!(
        fast.drain(),
        vec![OutboundMessage::CmdResponse {
            agent: "A".to_string(),
            data: json!("ok"),
            original_command: json!("three"),
        }]
    );
    assert_eq!(stalled.drain().len(), 1);
    assert!(hub.pending().is_empty());
}

#[tokio::test]
async fn test_keylog_accumulates() {
    let hub = test_hub();
    let mut agent = connect_agent(&hub, "A").await;
    let mut controller = TestConnection::open(&hub);

    agent
        .send(&hub, json!({"type": "keylogger", "data": "x"}))
        .await;
    agent
        .send(&hub, json!({"type": "keylogger", "data": "y"}))
        .await;
    controller
        .send(&hub, json!({"type": "get_keys", "agent": "A"}))
        .await;

    assert!(agent.drain().is_empty());
    assert_eq!(
        controller.drain(),
        vec![OutboundMessage::GetKeysResponse {
            agent: "A".to_string(),
            data: "xy".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_is_connected_follows_registration() {
    let hub = test_hub();
    let mut controller = TestConnection::open(&hub);
    let query = json!({"type": "is_connected", "agent": "ghost"});

    controller.send(&hub, query.clone()).await;
    let _ghost = connect_agent(&hub, "ghost").await;
    controller.send(&hub, query).await;

    assert_eq!(
        controller.drain(),
        vec![
            OutboundMessage::IsConnectedResponse {
                agent: "ghost".to_string(),
                connected: false,
            },
            OutboundMessage::IsConnectedResponse {
                agent: "ghost".to_string(),
                connected: true,
            },
        ]
    );
}

#[tokio::test]
async fn test_closing_agent_connection_unregisters() {
    let hub = test_hub();
    let agent = connect_agent(&hub, "A").await;
    let mut controller = TestConnection::open(&hub);

    hub.disconnect(&agent.session).await;

    assert!(hub.agents().lookup("A").is_none());
    controller
        .send(&hub, json!({"type": "is_connected", "agent": "A"}))
        .await;
    assert_eq!(
        controller.drain(),
        vec![OutboundMessage::IsConnectedResponse {
            agent: "A".to_string(),
            connected: false,
        }]
    );

    // The id is free again.
    let _again = connect_agent(&hub, "A").await;
}

#[tokio::test]
async fn test_agent_disconnect_fails_outstanding_requests() {
    let hub = test_hub();
    let mut agent = connect_agent(&hub, "A").await;
    let mut controller = TestConnection::open(&hub);

    controller
        .send(&hub, json!({"type": "fs", "agent": "A", "data": "/"}))
        .await;
    let request_id = forwarded_request_id(&agent.drain()[0]);

    hub.disconnect(&agent.session).await;

    assert!(hub.pending().is_empty());
    assert_eq!(
        controller.drain(),
        vec![OutboundMessage::Error {
            message: "Agent A disconnected before responding".to_string(),
            request_id: Some(request_id),
        }]
    );
}

#[tokio::test]
async fn test_requester_disconnect_drops_its_entries() {
    let hub = test_hub();
    let mut agent = connect_agent(&hub, "A").await;
    let mut controller = TestConnection::open(&hub);

    controller
        .send(&hub, json!({"type": "cmd", "agent": "A", "data": "whoami"}))
        .await;
    let request_id = forwarded_request_id(&agent.drain()[0]);
    hub.disconnect(&controller.session).await;
    assert!(hub.pending().is_empty());

    // The agent's answer is now a silent no-op.
    agent
        .send(
            &hub,
            json!({"type": "cmd_response", "request_id": request_id, "data": "root"}),
        )
        .await;
    assert!(agent.drain().is_empty());
}

#[tokio::test]
async fn test_unknown_type_has_no_side_effects() {
    let hub = test_hub();
    let _agent = connect_agent(&hub, "A").await;
    let mut conn = TestConnection::open(&hub);

    conn.send(&hub, json!({"type": "bogus", "agent": "A", "data": "dir"}))
        .await;

    assert_eq!(
        conn.drain(),
        vec![OutboundMessage::error("Unknown event type")]
    );
    assert_eq!(hub.agents().len(), 1);
    assert!(hub.pending().is_empty());
}
