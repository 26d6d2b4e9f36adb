//! Wire types shared by the Tutoria relay server and its clients.
//!
//! - [`frames`]: frames the server writes on a session's WebSocket
//! - [`relay`]: commands relayed from an ingress to a session
//! - [`ingress`]: request and response bodies of the one-shot HTTP endpoints

pub mod frames;
pub mod ingress;
pub mod relay;

pub use frames::{ConnectionStatus, ServerFrame};
pub use ingress::{
    ConnectionsResponse, HealthResponse, IngressResponse, RootResponse, TestCommandRequest,
    ToolCall, ToolFunction, WebhookRequest,
};
pub use relay::{Args, RelayMessage};
