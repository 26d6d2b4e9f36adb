//! Request and response bodies of the HTTP endpoints.
//!
//! Request fields are optional at the type level so that the server can
//! report exactly which required field is missing instead of rejecting the
//! whole body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Requests
// ============================================================================

/// Webhook carrying a tool call produced by an LLM.
///
/// ```json
/// {"session_id": "abc123",
///  "tool_call": {"function": {"name": "draw_circle", "arguments": "{\"x\":1}"}}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
}

/// Tool call descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ToolFunction>,
}

/// Function part of a tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolFunction {
    #[serde(default)]
    pub name: Option<String>,
    /// JSON-encoded argument object. An already decoded object is accepted too.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Direct command used for testing the relay without an LLM in the loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCommandRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
}

// ============================================================================
// Responses
// ============================================================================

/// Successful ingress response: `{"status": "success", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl IngressResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            warning: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Root endpoint greeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Number of sessions with a live connection.
    pub connections: usize,
    pub timestamp: DateTime<Utc>,
}

/// Live sessions currently reachable through the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<String>,
}
