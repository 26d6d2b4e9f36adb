//! WebSocket endpoint and per-connection lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket, close_code},
    },
    response::Response,
};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tutoria_protocol::ServerFrame;

use crate::api::AppState;

use super::connection::{Connection, ConnectionError, ConnectionHandle, DEFAULT_SEND_TIMEOUT};
use super::registry::SessionRegistry;

/// Session id used when a client connects to `/ws` without one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Per-connection behavior.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Send `{"type": "connection", ...}` once registered.
    pub send_confirmation: bool,
    /// Interval between server pings. `None` disables the heartbeat.
    pub ping_interval: Option<Duration>,
    /// Grace period after a missed ping before the peer is considered gone.
    pub pong_timeout: Duration,
    /// Longest a single write may take before the connection is dropped.
    pub send_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            send_confirmation: true,
            ping_interval: Some(Duration::from_secs(20)),
            pong_timeout: Duration::from_secs(10),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// WebSocket upgrade handler.
///
/// GET /ws/{session_id}
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, session_id, ws)
}

/// WebSocket upgrade handler for clients that do not name a session.
///
/// GET /ws
pub async fn ws_default_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    upgrade(state, DEFAULT_SESSION_ID.to_string(), ws)
}

fn upgrade(state: AppState, session_id: String, ws: WebSocketUpgrade) -> Response {
    info!(session_id = %session_id, "WebSocket upgrade request");
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| handle_ws_connection(socket, state, session_id))
}

/// Handle an upgraded WebSocket until it closes.
async fn handle_ws_connection(socket: WebSocket, state: AppState, session_id: String) {
    let (sender, receiver) = socket.split();
    let connection =
        Connection::with_send_timeout(session_id, Box::new(sender), state.connection.send_timeout);
    run_connection(
        connection,
        receiver,
        Arc::clone(&state.registry),
        &state.connection,
    )
    .await;
}

/// Releases the registry slot when the handler exits, however it exits.
struct Registration {
    registry: Arc<SessionRegistry>,
    connection: ConnectionHandle,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.connection.mark_closed();
        self.registry
            .release(self.connection.session_id(), self.connection.id());
    }
}

/// Drive one connection: register, confirm, serve inbound frames, tear down.
///
/// Returns once the peer disconnects, a read or write fails, the heartbeat
/// times out, or the connection is closed from elsewhere.
pub async fn run_connection<S>(
    connection: ConnectionHandle,
    mut inbound: S,
    registry: Arc<SessionRegistry>,
    options: &ConnectionOptions,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let session_id = connection.session_id().to_string();
    let connection_id = connection.id();

    if !connection.open() {
        warn!(session_id = %session_id, connection_id = %connection_id, "Connection already used");
        return;
    }
    if let Some(previous) = registry.register(&session_id, &connection) {
        info!(
            session_id = %session_id,
            connection_id = %previous.id(),
            "Closing superseded connection"
        );
        tokio::spawn(async move {
            previous
                .close(close_code::NORMAL, "superseded by a newer connection")
                .await;
        });
    }
    let _registration = Registration {
        registry,
        connection: Arc::clone(&connection),
    };
    info!(session_id = %session_id, connection_id = %connection_id, "WebSocket connected");

    if options.send_confirmation {
        if let Err(e) = connection.send_frame(&ServerFrame::connected(&session_id)).await {
            warn!(session_id = %session_id, error = %e, "Failed to send connection confirmation");
            return;
        }
    }

    let mut heartbeat = options.ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let idle_limit = options
        .ping_interval
        .map(|period| period + options.pong_timeout);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = connection.closed() => {
                debug!(session_id = %session_id, "Connection closed by send path");
                break;
            }

            frame = inbound.next() => {
                let Some(frame) = frame else {
                    info!(session_id = %session_id, "WebSocket stream ended");
                    break;
                };
                last_seen = Instant::now();
                let result = match frame {
                    Ok(Message::Text(text)) => reply(&connection, text.as_str()).await,
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => reply(&connection, text).await,
                        Err(_) => {
                            connection
                                .send_frame(&ServerFrame::error("binary frame is not valid UTF-8", &session_id))
                                .await
                        }
                    },
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(()),
                    Ok(Message::Close(frame)) => {
                        info!(
                            session_id = %session_id,
                            code = frame.as_ref().map(|f| f.code),
                            "Client closed WebSocket connection"
                        );
                        break;
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket read error");
                        break;
                    }
                };
                if let Err(e) = result {
                    warn!(session_id = %session_id, error = %e, "Failed to reply to client");
                    break;
                }
            }

            _ = next_tick(&mut heartbeat) => {
                if idle_limit.is_some_and(|limit| last_seen.elapsed() > limit) {
                    warn!(session_id = %session_id, "Heartbeat timed out");
                    break;
                }
                if let Err(e) = connection.send_ping().await {
                    warn!(session_id = %session_id, error = %e, "Failed to send ping");
                    break;
                }
            }
        }
    }

    info!(session_id = %session_id, connection_id = %connection_id, "WebSocket disconnected");
}

/// Echo a decoded message back, or report why it could not be decoded.
async fn reply(connection: &Connection, text: &str) -> Result<(), ConnectionError> {
    let session_id = connection.session_id();
    let frame = match serde_json::from_str::<Value>(text) {
        Ok(data) => {
            debug!(session_id = %session_id, "Received message");
            ServerFrame::echo(data, session_id)
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Invalid message from client");
            ServerFrame::error(format!("invalid message: {e}"), session_id)
        }
    };
    connection.send_frame(&frame).await
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
