//! Tutoria relay server.
//!
//! Browser clients hold one WebSocket per drawing session; commands arriving
//! over HTTP (an LLM tool-call webhook or a direct test endpoint) are pushed
//! down to the matching session.

pub mod api;
pub mod config;
pub mod ingress;
pub mod ws;

pub use api::{AppState, create_router};
pub use config::AppConfig;
