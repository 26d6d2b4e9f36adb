//! A single accepted WebSocket connection and its send capability.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;
use uuid::Uuid;

/// Longest a single write to a peer may take before the connection is dropped.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a live connection. The lifecycle handler owns the only strong
/// reference outside of in-flight dispatches.
pub type ConnectionHandle = Arc<Connection>;

/// Unique id of one connection instance (a reconnect gets a new id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// Lifecycle state of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Errors raised while writing to a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Write half of a duplex connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame to the peer.
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;

    /// Write a heartbeat ping.
    async fn send_ping(&mut self) -> anyhow::Result<()>;

    /// Write a close frame and flush.
    async fn close(&mut self, code: u16, reason: String) -> anyhow::Result<()>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> anyhow::Result<()> {
        self.send(Message::Ping(Default::default())).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: String) -> anyhow::Result<()> {
        self.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await?;
        self.flush().await?;
        Ok(())
    }
}

enum Write {
    Text(String),
    Ping,
}

/// One accepted connection for a session.
///
/// Writes are serialized through a mutex, so frames sent from different
/// tasks reach the peer in the order the lock was acquired.
pub struct Connection {
    id: ConnectionId,
    session_id: String,
    state: AtomicU8,
    sink: Mutex<Box<dyn FrameSink>>,
    send_timeout: Duration,
    closed: CancellationToken,
}

impl Connection {
    /// Wrap a sink in a new connection in the `Connecting` state.
    pub fn new(session_id: impl Into<String>, sink: Box<dyn FrameSink>) -> ConnectionHandle {
        Self::with_send_timeout(session_id, sink, DEFAULT_SEND_TIMEOUT)
    }

    /// Like [`new`](Self::new), giving up on any single write after `send_timeout`.
    pub fn with_send_timeout(
        session_id: impl Into<String>,
        sink: Box<dyn FrameSink>,
        send_timeout: Duration,
    ) -> ConnectionHandle {
        Arc::new(Self {
            id: ConnectionId::new(),
            session_id: session_id.into(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            sink: Mutex::new(sink),
            send_timeout,
            closed: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move `Connecting -> Open`. Returns false if the connection was already
    /// opened or closed.
    pub fn open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed` and wake the owning handler.
    ///
    /// Returns true only for the call that performed the transition.
    pub fn mark_closed(&self) -> bool {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        let first = previous != ConnectionState::Closed as u8;
        if first {
            debug!(
                connection_id = %self.id,
                session_id = %self.session_id,
                from = %ConnectionState::from_u8(previous),
                "Connection closed"
            );
        }
        self.closed.cancel();
        first
    }

    /// Resolves once the connection has been closed by any path.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Serialize `frame` as JSON and write it to the peer.
    ///
    /// A write failure or a write that does not finish within the send
    /// timeout closes the connection; no further sends are attempted.
    pub async fn send_frame<T: Serialize + ?Sized>(&self, frame: &T) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed(self.id));
        }
        let text = serde_json::to_string(frame)?;
        self.write(Write::Text(text)).await
    }

    /// Send a heartbeat ping. Fails like [`send_frame`](Self::send_frame).
    pub async fn send_ping(&self) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed(self.id));
        }
        self.write(Write::Ping).await
    }

    /// Close the connection and send a close frame to the peer (best effort,
    /// bounded by the send timeout).
    pub async fn close(&self, code: u16, reason: &str) {
        if !self.mark_closed() {
            return;
        }
        let reason = reason.to_string();
        let result = timeout(self.send_timeout, async {
            let mut sink = self.sink.lock().await;
            sink.close(code, reason).await
        })
        .await;

        let error = match result {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {:?}", self.send_timeout),
        };
        debug!(
            connection_id = %self.id,
            session_id = %self.session_id,
            error = %error,
            "Failed to send close frame"
        );
    }

    /// Run one sink operation under the write lock and the send timeout.
    async fn write(&self, op: Write) -> Result<(), ConnectionError> {
        let result = timeout(self.send_timeout, async {
            let mut sink = self.sink.lock().await;
            // May have closed while waiting for the lock.
            if !self.is_open() {
                return Err(ConnectionError::Closed(self.id));
            }
            let written = match op {
                Write::Text(text) => sink.send_text(text).await,
                Write::Ping => sink.send_ping().await,
            };
            written.map_err(|err| ConnectionError::Transport(err.to_string()))
        })
        .await;

        let result = result.unwrap_or_else(|_| {
            Err(ConnectionError::Transport(format!(
                "write timed out after {:?}",
                self.send_timeout
            )))
        });
        if matches!(result, Err(ConnectionError::Transport(_))) {
            self.mark_closed();
        }
        result
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}
