//! Live log streaming over WebSocket.
//!
//! Protocol: plain text frames, one log line each. Terminal conditions are
//! announced with a text frame followed by a close frame:
//! - `STREAM_COMPLETE`, close 1000, when the engine ends the stream
//! - `ERROR: <message>`, close 1011, when the stream fails
//! - `ERROR: Invalid container ID`, close 1007
//! - `ERROR: Container is not running`, close 1000
//! - `ERROR: <message>`, close 1011, for any other failure to open the
//!   stream, including an unknown or foreign container

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::logs::StreamEvent;

use super::extract::OwnerId;
use super::AppState;

pub const STREAM_COMPLETE: &str = "STREAM_COMPLETE";

pub async fn container_logs_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(raw_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, owner_id, raw_id))
}

/// Sends a final text frame and closes with `code`.
async fn finish(socket: &mut WebSocket, text: &str, code: u16) {
    if socket.send(Message::Text(text.to_string().into())).await.is_err() {
        return;
    }
    let frame = CloseFrame {
        code,
        reason: "".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(mut socket: WebSocket, state: AppState, owner_id: i64, raw_id: String) {
    let Ok(container_id) = raw_id.trim().parse::<i64>() else {
        finish(&mut socket, "ERROR: Invalid container ID", close_code::INVALID).await;
        return;
    };

    let mut subscription = match state.service.open_log_stream(container_id, owner_id).await {
        Ok(subscription) => subscription,
        Err(PlatformError::NotRunning) => {
            finish(&mut socket, "ERROR: Container is not running", close_code::NORMAL).await;
            return;
        }
        Err(err @ PlatformError::NotFound(_)) => {
            debug!(container_id, error = %err, "Log stream refused");
            finish(&mut socket, &format!("ERROR: {err}"), close_code::ERROR).await;
            return;
        }
        Err(err) => {
            warn!(container_id, error = %err, "Failed to open log stream");
            finish(&mut socket, &format!("ERROR: {err}"), close_code::ERROR).await;
            return;
        }
    };

    let connection = subscription.id();
    info!(container_id, connection = %connection, "Streaming logs");

    loop {
        tokio::select! {
            event = subscription.next_event() => match event {
                Some(StreamEvent::Line(line)) => {
                    if socket.send(Message::Text(line.into())).await.is_err() {
                        debug!(connection = %connection, "Client went away mid-send");
                        break;
                    }
                }
                Some(StreamEvent::Complete) | None => {
                    finish(&mut socket, STREAM_COMPLETE, close_code::NORMAL).await;
                    break;
                }
                Some(StreamEvent::Error(message)) => {
                    finish(&mut socket, &format!("ERROR: {message}"), close_code::ERROR).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(connection = %connection, "Client closed log stream");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    subscription.close();
    info!(container_id, connection = %connection, "Log stream closed");
}
