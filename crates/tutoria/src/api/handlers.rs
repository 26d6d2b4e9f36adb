//! API request handlers.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use chrono::Utc;
use tracing::info;
use tutoria_protocol::{
    ConnectionsResponse, HealthResponse, IngressResponse, RootResponse, TestCommandRequest,
    WebhookRequest,
};

use crate::ingress;

use super::error::ApiResult;
use super::state::AppState;

/// Root endpoint.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Tutoria relay server is running".to_string(),
    })
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.registry.len(),
        timestamp: Utc::now(),
    })
}

/// List sessions with a live connection.
pub async fn list_connections(State(state): State<AppState>) -> Json<ConnectionsResponse> {
    let connections = state.registry.session_ids();
    Json(ConnectionsResponse {
        count: connections.len(),
        connections,
    })
}

/// Relay an LLM tool call to the session's connection.
///
/// POST /api/v1/webhook/openai
pub async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> ApiResult<Json<IngressResponse>> {
    let Json(request) = payload?;
    let (session_id, message) = ingress::webhook_command(request)?;

    let delivered = state.relay.dispatch_message(&session_id, &message).await?;
    info!(
        session_id = %session_id,
        connection_id = %delivered.connection_id,
        cmd = %message.cmd,
        "Webhook command relayed"
    );

    let mut response = IngressResponse::success();
    if let Some(note) = message.error {
        response = response.with_warning(note);
    }
    Ok(Json(response))
}

/// Relay a command directly, bypassing any LLM.
///
/// POST /api/v1/test/draw
pub async fn test_draw(
    State(state): State<AppState>,
    payload: Result<Json<TestCommandRequest>, JsonRejection>,
) -> ApiResult<Json<IngressResponse>> {
    let Json(request) = payload?;
    let (session_id, message) = ingress::test_command(request)?;

    state.relay.dispatch_message(&session_id, &message).await?;
    info!(session_id = %session_id, cmd = %message.cmd, "Test command relayed");

    Ok(Json(
        IngressResponse::success().with_message(format!("Command sent to session {session_id}")),
    ))
}
