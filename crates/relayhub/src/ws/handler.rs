//! WebSocket handler for controller and agent connections.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use relayhub_protocol::encode;
use tokio::time::{Instant, interval_at};

use crate::api::AppState;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drive one connection until the peer goes away.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let hub = state.hub.clone();
    let (mut session, mut outbound) = hub.open_connection();
    let conn_id = session.id();
    info!("WebSocket connection {} opened", conn_id);

    let (mut sender, mut receiver) = socket.split();

    // Writer: drains the outbound queue and keeps the socket alive.
    let ping_every = state.ping_interval;
    let send_task = tokio::spawn(async move {
        let mut ping_interval = interval_at(Instant::now() + ping_every, ping_every);

        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if sender.send(Message::Text(encode(&message).into())).await.is_err() {
                        break;
                    }
                }

                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Frames from one connection are handled strictly in arrival order.
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => hub.dispatch(&mut session, text.as_str()).await,
            Ok(Message::Binary(data)) => hub.dispatch_bytes(&mut session, &data).await,
            Ok(Message::Ping(_)) => {
                debug!("Received ping on {}", conn_id);
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong on {}", conn_id);
            }
            Ok(Message::Close(_)) => {
                debug!("Peer closed {}", conn_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        }
    }

    send_task.abort();
    hub.disconnect(&session).await;
    info!("WebSocket connection {} closed", conn_id);
}
