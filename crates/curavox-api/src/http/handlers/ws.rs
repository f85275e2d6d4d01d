//! WebSocket handler for the duplex voice conversation.
//!
//! The `/ws` endpoint upgrades the HTTP connection and bridges the
//! socket to a per-connection [`Orchestrator`](curavox_core::orchestrator::Orchestrator):
//!
//! - a **reader** task pumps socket frames into the orchestrator's
//!   inbound channel as [`ClientFrame`]s
//! - a **writer** task serializes outbound [`ServerMessage`]s onto the
//!   socket as JSON text frames
//! - the orchestrator itself runs in between and owns the session
//!   lifecycle
//!
//! When the orchestrator finishes (session ended or transport lost) its
//! outbound sender drops, which ends the writer; the reader is aborted
//! since the client may never send another frame. All tasks are awaited
//! before the handler returns.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use curavox_core::orchestrator::ClientFrame;
use curavox_types::protocol::ServerMessage;

use crate::state::{AppState, ConcreteOrchestrator};

/// Channel capacity between the socket tasks and the orchestrator.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Upgrade an HTTP request to the duplex conversation WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(FRAME_CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<ClientFrame>(FRAME_CHANNEL_CAPACITY);

    let orchestrator = ConcreteOrchestrator::new(
        state.registry.clone(),
        state.stt.clone(),
        state.llm.clone(),
        state.tts.clone(),
        out_tx,
    );

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        // Client disconnected; the orchestrator notices
                        // via the reader side.
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!("failed to serialize server message: {err}");
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    let reader = tokio::spawn(async move {
        loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    if in_tx.send(ClientFrame::Binary(bytes.to_vec())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if in_tx.send(ClientFrame::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = in_tx.send(ClientFrame::Closed).await;
                    break;
                }
                // Ping/pong protocol frames are handled by axum.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!("WebSocket receive error: {err}");
                    let _ = in_tx.send(ClientFrame::Closed).await;
                    break;
                }
            }
        }
    });

    orchestrator.run(in_rx).await;

    // The orchestrator dropped its outbound sender, so the writer drains
    // and exits. The reader may be parked on a client that will never
    // send again; stop it explicitly.
    reader.abort();
    let _ = reader.await;
    if let Err(err) = writer.await {
        tracing::warn!(error = %err, "writer task join error");
    }

    tracing::debug!("WebSocket connection handler finished");
}
