//! Application state shared across handlers.

use std::sync::Arc;

use crate::ws::{ConnectionOptions, RelayDispatcher, SessionRegistry};

/// Default cap on a single inbound WebSocket message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session id -> live connection.
    pub registry: Arc<SessionRegistry>,
    /// Pushes ingress commands to connections.
    pub relay: RelayDispatcher,
    /// Behavior of accepted connections.
    pub connection: ConnectionOptions,
    /// Largest inbound WebSocket message accepted.
    pub max_message_bytes: usize,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(connection: ConnectionOptions) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            relay: RelayDispatcher::new(Arc::clone(&registry)),
            registry,
            connection,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ConnectionOptions::default())
    }
}
