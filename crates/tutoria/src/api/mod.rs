//! HTTP API module.
//!
//! REST endpoints for health, introspection and command ingress, plus the
//! WebSocket endpoint sessions connect to.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::{AppState, DEFAULT_MAX_MESSAGE_BYTES};
