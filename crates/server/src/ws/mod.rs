//! WebSocket channel lifecycle
//!
//! Each accepted socket gets a connection id and an unbounded frame queue;
//! a writer task drains the queue into the socket so the relay never awaits
//! a transport write. The connection stays unbound until the client sends a
//! `register` frame. Malformed frames are logged and ignored; only socket
//! close or a transport error ends the connection, at which point the relay
//! unbinds it.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppState;
use crate::protocol::{ClientFrame, ServerFrame};

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let conn_id = state.relay.connect(tx);
    info!("WebSocket connected: {}", conn_id);

    // Writer task: drains queued frames into the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode frame for {}: {}", conn_id, e);
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let relay = state.relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(next) = ws_rx.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("WebSocket error on {}: {}", conn_id, e);
                    break;
                }
            };
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Register { from }) => {
                        if let Err(e) = relay.register(&from, conn_id) {
                            warn!("Dropped register on {}: {}", conn_id, e);
                        }
                    }
                    Ok(ClientFrame::SendMessage {
                        from, to, text, ..
                    }) => match relay.route(&from, &to, &text, conn_id) {
                        Ok(message) => {
                            debug!("Connection {} sent message {}", conn_id, message.id)
                        }
                        Err(e) => warn!("Dropped send_message on {}: {}", conn_id, e),
                    },
                    Err(e) => warn!("Ignoring malformed frame on {}: {}", conn_id, e),
                },
                WsMessage::Close(_) => break,
                // Pings are answered by axum; binary and pong frames are
                // ignored in every state.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.relay.disconnect(conn_id);
    info!("WebSocket closed: {}", conn_id);
}
