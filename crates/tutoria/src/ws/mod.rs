//! WebSocket connections for drawing sessions.
//!
//! Each session has at most one live connection. Clients connect to
//! `/ws/{session_id}`; the [`SessionRegistry`] maps the session to that
//! connection and the [`RelayDispatcher`] pushes commands submitted over HTTP
//! down to it.

mod connection;
mod handler;
mod registry;
mod relay;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{
    Connection, ConnectionError, ConnectionHandle, ConnectionId, ConnectionState,
    DEFAULT_SEND_TIMEOUT, FrameSink,
};
pub use handler::{
    ConnectionOptions, DEFAULT_SESSION_ID, run_connection, ws_default_handler, ws_handler,
};
pub use registry::SessionRegistry;
pub use relay::{Delivered, RelayDispatcher, Undeliverable};
