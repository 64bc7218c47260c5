// =============================================================================
// WebSocket push endpoint
// =============================================================================
//
// Browser clients connect here and receive full snapshots of every live
// session. The push model is:
//
//   1. An immediate full snapshot on connect.
//   2. A fresh snapshot every 500 ms whenever the state version has changed
//      since the last send.
//
// The state version is bumped by tick processing and session lifecycle
// changes, so an idle market produces no traffic.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::session::SessionSnapshot;

/// Envelope pushed to every connected client.
#[derive(Debug, Serialize)]
struct PushFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    version: u64,
    sessions: Vec<SessionSnapshot>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    use futures_util::{SinkExt, StreamExt};

    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    // Initial full snapshot, then version-gated pushes.
    let mut last_sent_version = state.version();
    if let Err(e) = send_snapshot(&mut sender, &state).await {
        warn!(error = %e, "failed to send initial WebSocket snapshot");
        return;
    }

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current = state.version();
                if current != last_sent_version {
                    match send_snapshot(&mut sender, &state).await {
                        Ok(()) => last_sent_version = current,
                        Err(e) => {
                            debug!(error = %e, "WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Any text frame is treated as a client heartbeat.
                        debug!(msg = %text, "WebSocket text frame received");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("WebSocket Pong received");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("WebSocket binary frame ignored");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

async fn send_snapshot<S>(sender: &mut S, state: &Arc<AppState>) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    use futures_util::SinkExt;

    let frame = PushFrame {
        kind: "snapshot",
        version: state.version(),
        sessions: state.snapshots(),
    };

    match serde_json::to_string(&frame) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(
                version = frame.version,
                sessions = frame.sessions.len(),
                "pushed snapshot frame"
            );
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize snapshot frame");
            Ok(())
        }
    }
}
