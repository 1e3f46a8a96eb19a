//! WebSocket event push
//!
//! A session is keyed by `client_id` and starts subscribed to every topic.
//! Clients narrow it with `{"type":"subscribe"|"unsubscribe","topic":...}`
//! frames and keep it alive with `{"type":"ping"}`. Events are pushed as
//! `{"type":"event","event":{...}}`. A session whose queue overflows is
//! dropped by the bus; this handler then observes the closed channel and
//! ends the socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use zkiot_core::types::{Event, EventKind};

use crate::state::AppState;

/// Incoming control frames
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame {
    Subscribe { topic: EventKind },
    Unsubscribe { topic: EventKind },
    Ping,
}

/// Outgoing frames
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame {
    Event { event: Event },
    Pong,
    Subscribed { topic: EventKind },
    Unsubscribed { topic: EventKind },
    Error { message: String },
}

/// Upgrade `/ws/{client_id}` into an event push session
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_session(state, client_id, socket))
}

async fn run_session(state: AppState, client_id: String, mut socket: WebSocket) {
    let mut events = state.bus.connect(&client_id).await;
    debug!(client_id, "websocket session opened");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    let frame = ServerFrame::Event { event };
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
                // The bus dropped us (slow consumer or replaced session).
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_frame(&state, &client_id, &text).await;
                    if send_frame(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.bus.disconnect(&client_id).await;
    debug!(client_id, "websocket session closed");
}

async fn handle_frame(state: &AppState, client_id: &str, text: &str) -> ServerFrame {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe { topic }) => {
            state.bus.subscribe_topic(client_id, topic).await;
            ServerFrame::Subscribed { topic }
        }
        Ok(ClientFrame::Unsubscribe { topic }) => {
            state.bus.unsubscribe_topic(client_id, topic).await;
            ServerFrame::Unsubscribed { topic }
        }
        Ok(ClientFrame::Ping) => ServerFrame::Pong,
        Err(e) => ServerFrame::Error {
            message: format!("bad frame: {}", e),
        },
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_else(|_| {
        json!({"type": "error", "message": "serialization failed"}).to_string()
    });
    socket.send(Message::Text(text)).await
}
