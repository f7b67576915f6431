//! Wire types for the `/ws/graphrag` endpoint.

use serde::{Deserialize, Serialize};

/// Value of the `source` field on successful answers.
pub const RESPONSE_SOURCE: &str = "bedrock";

/// Error text sent when the opening frame lacks either identifier.
pub const INVALID_SESSION_INFO: &str = "Invalid session_id or child_id";

/// Error text for failures whose detail stays server-side.
pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// A frame sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// `{"response": "...", "source": "bedrock"}`
    Response { response: String, source: String },
    /// `{"error": "..."}`
    Error { error: String },
    /// `{"msg": "..."}`
    Info { msg: String },
}

impl ServerMessage {
    pub fn response(text: impl Into<String>) -> Self {
        Self::Response {
            response: text.into(),
            source: RESPONSE_SOURCE.to_string(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { error: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::Info { msg: text.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A frame received from a client, reduced to what the conversation loop needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary,
    /// Close frame, transport error, or end of stream.
    Close,
}

/// Opening frame identifying the session and the child it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub child_id: String,
}

impl SessionInfo {
    /// Extract both identifiers from the opening frame.
    ///
    /// Each must be present as a non-empty string.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

        let field = |name: &str| {
            value
                .get(name)
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        match (field("session_id"), field("child_id")) {
            (Some(session_id), Some(child_id)) => Ok(Self {
                session_id,
                child_id,
            }),
            (None, _) => Err("missing session_id".into()),
            (_, None) => Err("missing child_id".into()),
        }
    }
}
