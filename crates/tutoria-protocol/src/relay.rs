//! Commands relayed to a session's browser client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named arguments of a relayed command.
pub type Args = Map<String, Value>;

/// A command pushed into a session's stream, e.g. `{"cmd": "draw_circle", "args": {"x": 1}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Command name (the tool function name for webhook ingress).
    pub cmd: String,

    /// Command arguments.
    #[serde(default)]
    pub args: Args,

    /// Set when the ingress could not decode the original arguments and
    /// substituted an empty map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayMessage {
    pub fn new(cmd: impl Into<String>, args: Args) -> Self {
        Self {
            cmd: cmd.into(),
            args,
            error: None,
        }
    }

    /// Attach a note explaining why `args` was replaced.
    pub fn with_error(mut self, note: impl Into<String>) -> Self {
        self.error = Some(note.into());
        self
    }
}
