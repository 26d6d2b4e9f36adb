//! Frames written by the server on a session's WebSocket.
//!
//! Relayed commands are sent as a bare [`RelayMessage`](crate::RelayMessage);
//! everything else the server says is one of these tagged frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status carried by the connection confirmation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
}

/// Server -> client frames, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once after the connection is registered.
    Connection {
        status: ConnectionStatus,
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Reply to a well-formed JSON message from the client.
    Echo {
        data: Value,
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Reply to a message that could not be decoded. The connection stays open.
    Error {
        message: String,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    pub fn connected(session_id: impl Into<String>) -> Self {
        Self::Connection {
            status: ConnectionStatus::Connected,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn echo(data: Value, session_id: impl Into<String>) -> Self {
        Self::Echo {
            data,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Connection { session_id, .. }
            | Self::Echo { session_id, .. }
            | Self::Error { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connected_frame_shape() {
        let value = serde_json::to_value(ServerFrame::connected("abc123")).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["status"], "connected");
        assert_eq!(value["session_id"], "abc123");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_echo_frame_keeps_data() {
        let value = serde_json::to_value(ServerFrame::echo(json!("hello"), "abc123")).unwrap();
        assert_eq!(value["type"], "echo");
        assert_eq!(value["data"], "hello");
        assert_eq!(value["session_id"], "abc123");
    }

    #[test]
    fn test_error_frame_parses_back() {
        let text = serde_json::to_string(&ServerFrame::error("invalid message", "s1")).unwrap();
        let frame: ServerFrame = serde_json::from_str(&text).unwrap();
        assert!(matches!(frame, ServerFrame::Error { ref message, .. } if message == "invalid message"));
        assert_eq!(frame.session_id(), "s1");
    }
}
