//! End-to-end tests over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relayhub::relay::RelayHub;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

mod common;
use common::test_app;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<RelayHub>) {
    let (app, hub) = test_app();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _response) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn send(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn recv(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_cmd_round_trip_over_websocket() {
    let (addr, _hub) = spawn_server().await;
    let mut agent = connect(addr).await;
    let mut controller = connect(addr).await;

    send(&mut agent, json!({"type": "agent-auth", "data": "JC17046684"})).await;
    assert_eq!(
        recv(&mut agent).await,
        json!({"type": "success", "message": "Authentication successful"})
    );

    send(
        &mut controller,
        json!({"agent": "JC17046684", "type": "cmd", "data": "dir"}),
    )
    .await;
    let forwarded = recv(&mut agent).await;
    assert_eq!(forwarded["type"], "cmd");
    assert_eq!(forwarded["data"], "dir");
    let request_id = forwarded["request_id"].as_str().unwrap().to_string();

    send(
        &mut agent,
        json!({"type": "cmd_response", "request_id": request_id, "data": "volume C"}),
    )
    .await;
    assert_eq!(
        recv(&mut controller).await,
        json!({
            "type": "cmd_response",
            "agent": "JC17046684",
            "data": "volume C",
            "original_command": "dir"
        })
    );
}

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let (addr, _hub) = spawn_server().await;
    let mut client = connect(addr).await;

    client
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert!(
        reply["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid message format: ")
    );

    send(&mut client, json!({"type": "bogus"})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "error", "message": "Unknown event type"})
    );

    client
        .send(Message::Binary(
            br#"{"type":"data","payload":1}"#.to_vec().into(),
        ))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "ack", "message": "Data received"})
    );
}

#[tokio::test]
async fn test_socket_close_unregisters_agent() {
    let (addr, hub) = spawn_server().await;
    let mut agent = connect(addr).await;
    let mut controller = connect(addr).await;

    send(&mut agent, json!({"type": "agent-auth", "data": "A"})).await;
    recv(&mut agent).await;
    send(&mut controller, json!({"type": "fs", "agent": "A", "data": "."})).await;
    let request_id = recv(&mut agent).await["request_id"].clone();

    agent.close(None).await.unwrap();
    wait_until(|| !hub.agents().is_connected("A")).await;

    assert_eq!(
        recv(&mut controller).await,
        json!({
            "type": "error",
            "message": "Agent A disconnected before responding",
            "request_id": request_id
        })
    );
    assert!(hub.pending().is_empty());

    send(&mut controller, json!({"type": "is_connected", "agent": "A"})).await;
    assert_eq!(
        recv(&mut controller).await,
        json!({"type": "is_connected_response", "agent": "A", "connected": false})
    );
}
