//! Model-facing message shapes.
//!
//! A server reconstructs these from [`UiMessage`]s before prompting the
//! model: user messages keep text or multimodal content, assistant
//! messages carry a `toolCalls` array, and each tool result becomes its
//! own `role=tool` message keyed by the call id. Thinking parts never
//! reach the model.

use crate::message::ContentPart;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a model-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// End-user turn.
    User,
    /// Assistant turn.
    Assistant,
    /// System instructions.
    System,
    /// Tool result turn.
    Tool,
}

/// Message content: a plain string or an array of multimodal parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelContent {
    /// Plain text content.
    Text(String),
    /// Multimodal content parts, passed through opaquely.
    Parts(Vec<ContentPart>),
}

impl ModelContent {
    /// The text, when content is plain text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Parts(_) => None,
        }
    }
}

/// A tool invocation recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelToolCall {
    /// Tool call id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Value,
}

/// A message in the shape the model round-trip expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMessage {
    /// Message role.
    pub role: ModelRole,
    /// Message content.
    pub content: ModelContent,
    /// Tool calls issued by an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ModelToolCall>>,
    /// Call id a `role=tool` message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ModelMessage {
    /// Create a plain-text message.
    #[must_use]
    pub fn text(role: ModelRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: ModelContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::Tool,
            content: ModelContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message_wire_shape() {
        let msg = ModelMessage::text(ModelRole::User, "hi");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_tool_message_wire_shape() {
        let msg = ModelMessage::tool("call_1", "42");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v,
            json!({"role": "tool", "content": "42", "toolCallId": "call_1"})
        );
    }

    #[test]
    fn test_untagged_content_roundtrip() {
        use crate::message::ContentKind;

        let msg = ModelMessage {
            role: ModelRole::User,
            content: ModelContent::Parts(vec![ContentPart::url(
                ContentKind::Image,
                "https://x.test/a.png",
            )]),
            tool_calls: None,
            tool_call_id: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ModelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
