//! WebSocket handler for real-time engine updates

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use graph_engine::{EngineEvent, EngineStatus};
use serde::Serialize;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    EngineStarted { status: EngineStatus },
    EngineStopped { status: EngineStatus },
    Status { status: EngineStatus },
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Send connected message
    let connected_msg = serde_json::to_string(&WsEvent::Connected).unwrap();
    if sender.send(Message::Text(connected_msg)).await.is_err() {
        return;
    }

    // Forward engine events to the socket
    let mut event_rx = state.engine.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let ws_event = match event {
                        EngineEvent::Started { status } => WsEvent::EngineStarted { status },
                        EngineEvent::Stopped { status } => WsEvent::EngineStopped { status },
                        EngineEvent::Status { status } => WsEvent::Status { status },
                    };

                    let json = serde_json::to_string(&ws_event).unwrap();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Skip missed messages
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    });

    // Incoming messages double as frontend heartbeats
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.trim() == "heartbeat" {
                    state.engine.services().arbiter.heartbeat();
                }
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Clean up
    send_task.abort();
}
