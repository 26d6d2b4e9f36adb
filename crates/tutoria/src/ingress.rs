//! Validation of one-shot ingress requests into relay messages.
//!
//! Both adapters produce a `(session_id, RelayMessage)` pair that the HTTP
//! layer hands to the [`RelayDispatcher`](crate::ws::RelayDispatcher).

use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use tutoria_protocol::{Args, RelayMessage, TestCommandRequest, WebhookRequest};

/// Why an ingress request was rejected before dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngressError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Validate a webhook tool call.
///
/// Malformed `arguments` do not reject the request: the command is relayed
/// with an empty argument map and an `error` note on the message.
pub fn webhook_command(request: WebhookRequest) -> Result<(String, RelayMessage), IngressError> {
    let session_id = required(request.session_id, "session_id")?;
    let tool_call = request
        .tool_call
        .ok_or(IngressError::MissingField("tool_call"))?;
    let function = tool_call
        .function
        .ok_or(IngressError::MissingField("tool_call.function"))?;
    let name = required(function.name, "tool_call.function.name")?;

    let message = match decode_arguments(function.arguments) {
        Ok(args) => RelayMessage::new(name, args),
        Err(note) => {
            warn!(session_id = %session_id, cmd = %name, error = %note, "Malformed tool call arguments");
            RelayMessage::new(name, Args::new()).with_error(note)
        }
    };
    Ok((session_id, message))
}

/// Validate a direct test command.
pub fn test_command(request: TestCommandRequest) -> Result<(String, RelayMessage), IngressError> {
    let session_id = required(request.session_id, "session_id")?;
    let command = required(request.command, "command")?;

    let args = match request.args {
        None | Some(Value::Null) => Args::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(IngressError::MalformedPayload(format!(
                "args must be an object, got {}",
                kind(&other)
            )));
        }
    };
    Ok((session_id, RelayMessage::new(command, args)))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, IngressError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IngressError::MissingField(field)),
    }
}

/// Decode tool call arguments into a map, or describe why they could not be.
fn decode_arguments(arguments: Option<Value>) -> Result<Args, String> {
    match arguments {
        None | Some(Value::Null) => Ok(Args::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(Args::new()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("arguments must decode to an object, got {}", kind(&other))),
            Err(e) => Err(format!("invalid arguments JSON: {e}")),
        },
        Some(other) => Err(format!("arguments must be a JSON string, got {}", kind(&other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
