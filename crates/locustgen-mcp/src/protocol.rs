use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Command envelope wire types
// ---------------------------------------------------------------------------

/// One inbound command: `{"command": "...", "params": {...}}`.
///
/// `requestId` is optional and echoed back verbatim.
#[derive(Debug, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    /// Absent params are treated as `null`.
    #[serde(default)]
    pub params: Value,
    #[serde(default, rename = "requestId", alias = "request_id")]
    pub request_id: Option<Value>,
}

/// Reply to one command. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
}

impl CommandResponse {
    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            request_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<Value>) -> Self {
        self.request_id = request_id;
        self
    }
}

// ---------------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------------

/// Returned from the `initialize` command.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub text_document: bool,
    pub workspace: bool,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            capabilities: ServerCapabilities {
                text_document: true,
                workspace: true,
            },
        }
    }
}
