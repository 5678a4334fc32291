use serde::{Deserialize, Serialize};

use crate::core::prompt::AgentMode;

/// Speaker of a message as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Body the chat client posts to the relay endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(
        rename = "documentContext",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub document_context: Option<String>,
}

/// Body the relay forwards to the upstream completion gateway.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Deserialize, Default)]
pub struct ChatResponseDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    #[serde(default)]
    pub delta: Option<ChatResponseDelta>,
}

/// One `data:` payload of the completion stream.
///
/// Gateways send `null` for `choices` or `delta` on bookkeeping frames; those
/// carry no text.
#[derive(Deserialize)]
pub struct StreamEnvelope {
    #[serde(default)]
    pub choices: Option<Vec<ChatResponseChoice>>,
}

impl StreamEnvelope {
    /// Text carried by the first choice, if any.
    pub fn into_delta(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
    }
}

/// JSON body returned with non-success statuses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
