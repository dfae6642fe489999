//! WebSocket handler for the note protocol.
//!
//! On connect the client receives a `notes` snapshot followed by the `tools`
//! catalog. Afterwards every event published by the engine is forwarded, and
//! inbound `createNote` / `updateNote` / `deleteNote` messages are applied.
//! Malformed or rejected messages are answered with `{"type":"error"}` to the
//! sender only.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use notefabric_core::protocol::{InboundMessage, OutboundMessage};
use notefabric_scheduler::FabricEngine;
use tokio::sync::broadcast::error::RecvError;

use super::server::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("🔌 WebSocket client connected");
    let engine = state.engine.clone();
    let mut events = engine.subscribe();

    let hello = [
        OutboundMessage::Notes {
            data: engine.snapshot(),
        },
        OutboundMessage::Tools {
            data: engine.tools(),
        },
    ];
    for msg in &hello {
        if send_message(&mut socket, msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(incoming) = incoming else { break };
                match incoming {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = handle_text(&engine, text.as_str()).await
                            && send_message(&mut socket, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("WS receive error: {e}");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(msg) => {
                        if send_message(&mut socket, &msg).await.is_err() {
                            break;
                        }
                    }
                    // Slow client: resync with a full snapshot instead of replaying.
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("⚠️ WS client lagged by {skipped} event(s), resyncing");
                        let snapshot = OutboundMessage::Notes { data: engine.snapshot() };
                        if send_message(&mut socket, &snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::info!("🔌 WebSocket client disconnected");
}

/// Parse and apply one client frame. Returns the reply for the sender, if any;
/// successful mutations are announced to every client through the event bus.
pub async fn handle_text(engine: &FabricEngine, text: &str) -> Option<OutboundMessage> {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(msg) => handle_inbound(engine, msg).await,
        Err(e) => Some(error_message(format!("Invalid message: {e}"))),
    }
}

pub async fn handle_inbound(engine: &FabricEngine, msg: InboundMessage) -> Option<OutboundMessage> {
    let result = match msg {
        InboundMessage::CreateNote { title } => {
            engine.create_note(&title);
            Ok(())
        }
        InboundMessage::UpdateNote { id, fields } => engine.update_note(&id, &fields).map(|_| ()),
        InboundMessage::DeleteNote { id } => engine.delete_note(&id).await.map(|_| ()),
    };
    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::debug!("Rejected client message: {e}");
            Some(error_message(e.to_string()))
        }
    }
}

fn error_message(message: String) -> OutboundMessage {
    OutboundMessage::Error { message }
}

async fn send_message(socket: &mut WebSocket, msg: &OutboundMessage) -> Result<(), ()> {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("WS encode failed: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await.map_err(|e| {
        tracing::error!("WS send failed: {e}");
    })
}
