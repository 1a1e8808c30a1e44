//! Event Feed WebSocket Handler
//!
//! Streams [`MonitorEvent`]s to UI listeners as JSON text frames:
//!
//! ```json
//! {"type": "channel_changed", "data": {"status": "connected"}}
//! {"type": "alert_recorded", "data": {"id": "...", "title": "긴급 상황", ...}}
//! ```
//!
//! The stream is one-way. Inbound text is ignored; close ends the session.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::application::services::MonitorEvent;
use crate::domain::SignalingChannel;
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(event: &MonitorEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode monitor event");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let listener_id = Uuid::new_v4();
    // Subscribe before the greeting so nothing published in between is lost.
    let mut events = state.feed.subscribe();
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(%listener_id, "Event listener connected");

    let greeting = [
        MonitorEvent::ChannelChanged {
            status: state.channel.status(),
        },
        MonitorEvent::AlertsChanged {
            unread: state.alerts.unread_count().await,
        },
    ];
    for event in &greeting {
        if let Some(message) = encode(event) {
            if sender.send(message).await.is_err() {
                return;
            }
        }
    }

    let forward = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(message) = encode(&event) else {
                        continue;
                    };
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%listener_id, skipped, "Event listener lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    forward.abort();
    tracing::debug!(%listener_id, "Event listener disconnected");
}
