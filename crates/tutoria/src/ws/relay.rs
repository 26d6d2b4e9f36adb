//! Relay of externally submitted commands to a session's connection.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use tutoria_protocol::{Args, RelayMessage};

use super::connection::{ConnectionError, ConnectionId};
use super::registry::SessionRegistry;

/// A relay message was written to the session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub connection_id: ConnectionId,
}

/// A relay message could not be delivered. Never retried.
#[derive(Debug, Error)]
pub enum Undeliverable {
    #[error("no live connection for session {session_id}")]
    NoConnection { session_id: String },

    #[error("failed to deliver to session {session_id}: {source}")]
    SendFailed {
        session_id: String,
        #[source]
        source: ConnectionError,
    },
}

impl Undeliverable {
    pub fn session_id(&self) -> &str {
        match self {
            Self::NoConnection { session_id } | Self::SendFailed { session_id, .. } => session_id,
        }
    }
}

/// Best-effort handoff of relay messages to live connections.
///
/// No queueing and no retry: a dispatch either writes the message to the
/// connection registered at the time of the call or reports it undeliverable.
#[derive(Clone)]
pub struct RelayDispatcher {
    registry: Arc<SessionRegistry>,
}

impl RelayDispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Send `command` with `args` to the connection of `session_id`.
    pub async fn dispatch(
        &self,
        session_id: &str,
        command: impl Into<String>,
        args: Args,
    ) -> Result<Delivered, Undeliverable> {
        self.dispatch_message(session_id, &RelayMessage::new(command, args))
            .await
    }

    /// Send a prepared relay message to the connection of `session_id`.
    pub async fn dispatch_message(
        &self,
        session_id: &str,
        message: &RelayMessage,
    ) -> Result<Delivered, Undeliverable> {
        let Some(connection) = self.registry.lookup(session_id) else {
            debug!(session_id = %session_id, cmd = %message.cmd, "No connection for relay");
            return Err(Undeliverable::NoConnection {
                session_id: session_id.to_string(),
            });
        };

        // A failed send closes the connection; its handler releases the entry.
        match connection.send_frame(message).await {
            Ok(()) => {
                debug!(
                    session_id = %session_id,
                    connection_id = %connection.id(),
                    cmd = %message.cmd,
                    "Relayed command"
                );
                Ok(Delivered {
                    connection_id: connection.id(),
                })
            }
            Err(source) => {
                warn!(
                    session_id = %session_id,
                    connection_id = %connection.id(),
                    cmd = %message.cmd,
                    error = %source,
                    "Relay send failed"
                );
                Err(Undeliverable::SendFailed {
                    session_id: session_id.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::{Connection, ConnectionState};
    use crate::ws::test_support::{RecordingSink, StalledSink};
    use std::time::Duration;
    use serde_json::json;

    fn dispatcher() -> RelayDispatcher {
        RelayDispatcher::new(Arc::new(SessionRegistry::new()))
    }

    #[tokio::test]
    async fn test_dispatch_to_unknown_session_is_undeliverable() {
        let relay = dispatcher();
        let err = relay.dispatch("ghost", "draw_circle", Args::new()).await.unwrap_err();
        assert!(matches!(err, Undeliverable::NoConnection { .. }));
        assert_eq!(err.session_id(), "ghost");
    }

    #[tokio::test]
    async fn test_dispatch_writes_relay_message() {
        let relay = dispatcher();
        let (sink, log) = RecordingSink::new();
        let conn = Connection::new("abc123", Box::new(sink));
        conn.open();
        relay.registry().register("abc123", &conn);

        let args = json!({"x": 1, "y": 2}).as_object().cloned().unwrap();
        let delivered = relay.dispatch("abc123", "draw_circle", args).await.unwrap();

        assert_eq!(delivered.connection_id, conn.id());
        assert_eq!(log.json(), vec![json!({"cmd": "draw_circle", "args": {"x": 1, "y": 2}})]);
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order_per_session() {
        let relay = dispatcher();
        let (sink, log) = RecordingSink::new();
        let conn = Connection::new("s", Box::new(sink));
        conn.open();
        relay.registry().register("s", &conn);

        for i in 0..5 {
            let args = json!({"i": i}).as_object().cloned().unwrap();
            relay.dispatch("s", "step", args).await.unwrap();
        }

        let order: Vec<i64> = log
            .json()
            .iter()
            .map(|v| v["args"]["i"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_send_failure_is_undeliverable_and_closes() {
        let relay = dispatcher();
        let (sink, log) = RecordingSink::new();
        let conn = Connection::new("abc123", Box::new(sink));
        conn.open();
        relay.registry().register("abc123", &conn);
        log.fail_writes();

        let err = relay.dispatch("abc123", "draw_circle", Args::new()).await.unwrap_err();
        assert!(matches!(err, Undeliverable::SendFailed { .. }));
        assert_eq!(conn.state(), ConnectionState::Closed);

        // A second attempt does not touch the transport again.
        let err = relay.dispatch("abc123", "draw_circle", Args::new()).await.unwrap_err();
        assert!(matches!(
            err,
            Undeliverable::SendFailed { source: ConnectionError::Closed(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_to_closed_but_registered_connection() {
        let relay = dispatcher();
        let (sink, _log) = RecordingSink::new();
        let conn = Connection::new("abc123", Box::new(sink));
        conn.open();
        relay.registry().register("abc123", &conn);
        conn.mark_closed();

        let err = relay.dispatch("abc123", "noop", Args::new()).await.unwrap_err();
        assert!(matches!(err, Undeliverable::SendFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_and_shutdown_do_not_hang_on_stalled_peer() {
        let relay = dispatcher();
        let conn = Connection::with_send_timeout("s", Box::new(StalledSink), Duration::from_secs(2));
        conn.open();
        relay.registry().register("s", &conn);

        let err = tokio::time::timeout(Duration::from_secs(5), relay.dispatch("s", "a", Args::new()))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Undeliverable::SendFailed { .. }));

        let closed = tokio::time::timeout(
            Duration::from_secs(5),
            relay.registry().close_all(1001, "server shutting down"),
        )
        .await
        .unwrap();
        assert_eq!(closed, 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
