//! UI message and part types.
//!
//! A [`UiMessage`] is a message as displayed and stored in the client: an
//! ordered sequence of typed parts. Parts are only ever mutated by the
//! stream processor; everything else holds read-only snapshots.

use crate::identifier::{generate_message_id, now_utc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user input.
    User,
    /// Model output.
    #[default]
    Assistant,
    /// System instructions.
    System,
}

/// Lifecycle state of a tool call as it streams in.
///
/// States only ever advance; see [`ToolCallState::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    /// Call opened, no argument bytes received yet.
    #[default]
    AwaitingInput,
    /// Argument JSON is streaming in.
    InputStreaming,
    /// Arguments are final.
    InputComplete,
    /// Waiting for the user to approve or deny the call.
    ApprovalRequested,
    /// The user has responded to the approval request.
    ApprovalResponded,
}

impl ToolCallState {
    /// Position of this state in the forward-only ordering.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::AwaitingInput => 0,
            Self::InputStreaming => 1,
            Self::InputComplete => 2,
            Self::ApprovalRequested => 3,
            Self::ApprovalResponded => 4,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        next.rank() >= self.rank()
    }
}

/// Completion state of a tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolResultState {
    /// Result content is still streaming.
    Streaming,
    /// Result is final.
    #[default]
    Complete,
    /// Tool execution failed; `error` carries the detail.
    Error,
}

/// Approval metadata attached to a gated tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolApproval {
    /// Unique identifier of the approval handshake.
    pub id: String,
    /// Whether the call requires approval before execution.
    pub needs_approval: bool,
    /// The user's decision, once given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
}

impl ToolApproval {
    /// Create a pending approval gate.
    #[must_use]
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            needs_approval: true,
            approved: None,
        }
    }
}

/// Model or user prose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    /// The text content.
    pub content: String,
}

impl TextPart {
    /// Create a new text part.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Model reasoning content. UI-only; never sent back to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThinkingPart {
    /// The reasoning content.
    pub content: String,
}

impl ThinkingPart {
    /// Create a new thinking part.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A request from the model to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    /// Unique tool call identifier.
    pub id: String,
    /// Name of the tool being called.
    pub name: String,
    /// Raw JSON argument string as accumulated so far.
    pub arguments: String,
    /// Lifecycle state.
    pub state: ToolCallState,
    /// Approval gate, if the call is approval-gated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<ToolApproval>,
    /// Execution output, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ToolCallPart {
    /// Create a new tool call in the awaiting-input state.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
            state: ToolCallState::AwaitingInput,
            approval: None,
            output: None,
        }
    }

    /// Set the argument string.
    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    /// Set the lifecycle state.
    #[must_use]
    pub fn with_state(mut self, state: ToolCallState) -> Self {
        self.state = state;
        self
    }
}

/// The recorded result of a tool call, keyed by the call's id.
///
/// Kept distinct from [`ToolCallPart`] because the LLM round-trip requires a
/// result record addressed by `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPart {
    /// Identifier of the tool call this result belongs to.
    pub tool_call_id: String,
    /// Stringified result content.
    pub content: String,
    /// Completion state.
    pub state: ToolResultState,
    /// Error detail when `state` is [`ToolResultState::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResultPart {
    /// Create a completed tool result.
    #[must_use]
    pub fn complete(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            state: ToolResultState::Complete,
            error: None,
        }
    }

    /// Create an errored tool result.
    #[must_use]
    pub fn error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            tool_call_id: tool_call_id.into(),
            content: error.clone(),
            state: ToolResultState::Error,
            error: Some(error),
        }
    }
}

/// Kind of a multimodal content part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text.
    Text,
    /// Image content.
    Image,
    /// Audio content.
    Audio,
    /// Video content.
    Video,
    /// Document content.
    Document,
}

/// Where a content part's payload lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `value` is a URL.
    Url,
    /// `value` is inline (typically base64) data.
    Data,
}

/// Payload location for a multimodal content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSource {
    /// Whether `value` is a URL or inline data.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// The URL or inline data.
    pub value: String,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Multimodal user input, passed through opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// What kind of content this is.
    pub kind: ContentKind,
    /// Where the payload lives.
    pub source: ContentSource,
}

impl ContentPart {
    /// Create a URL-sourced content part.
    #[must_use]
    pub fn url(kind: ContentKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            source: ContentSource {
                kind: SourceKind::Url,
                value: value.into(),
                mime_type: None,
            },
        }
    }

    /// Create an inline-data content part.
    #[must_use]
    pub fn data(
        kind: ContentKind,
        value: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: ContentSource {
                kind: SourceKind::Data,
                value: value.into(),
                mime_type: Some(mime_type.into()),
            },
        }
    }
}

/// A typed fragment of a [`UiMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// Prose.
    Text(TextPart),
    /// Model reasoning.
    Thinking(ThinkingPart),
    /// Tool invocation request.
    ToolCall(ToolCallPart),
    /// Tool invocation result.
    ToolResult(ToolResultPart),
    /// Multimodal content.
    Content(ContentPart),
}

impl MessagePart {
    /// Create a text part.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(TextPart::new(content))
    }

    /// Create a thinking part.
    #[must_use]
    pub fn thinking(content: impl Into<String>) -> Self {
        Self::Thinking(ThinkingPart::new(content))
    }

    /// Check if this is a text part.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Check if this is a thinking part.
    #[must_use]
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking(_))
    }

    /// Check if this is a tool call part.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall(_))
    }

    /// Check if this is a tool result part.
    #[must_use]
    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult(_))
    }
}

/// A message as displayed and stored in the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMessage {
    /// Opaque identifier, unique within the conversation.
    pub id: String,
    /// Message role.
    pub role: Role,
    /// Ordered message parts.
    pub parts: Vec<MessagePart>,
    /// Creation timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UiMessage {
    /// Create an empty message with the given id and role.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
            created_at: Some(now_utc()),
        }
    }

    /// Create a user message from plain text.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        let mut msg = Self::new(generate_message_id(), Role::User);
        msg.parts.push(MessagePart::text(text));
        msg
    }

    /// Create a user message from explicit parts.
    #[must_use]
    pub fn user_with_parts(parts: Vec<MessagePart>) -> Self {
        let mut msg = Self::new(generate_message_id(), Role::User);
        msg.parts = parts;
        msg
    }

    /// Create an empty assistant message with the given id.
    #[must_use]
    pub fn assistant(id: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant)
    }

    /// Create a system message from plain text.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        let mut msg = Self::new(generate_message_id(), Role::System);
        msg.parts.push(MessagePart::text(text));
        msg
    }

    /// Append a part.
    #[must_use]
    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    /// The last part, if any.
    #[must_use]
    pub fn last_part(&self) -> Option<&MessagePart> {
        self.parts.last()
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text(t) => Some(t.content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Find a tool call part by id.
    #[must_use]
    pub fn tool_call(&self, tool_call_id: &str) -> Option<&ToolCallPart> {
        self.parts.iter().find_map(|p| match p {
            MessagePart::ToolCall(tc) if tc.id == tool_call_id => Some(tc),
            _ => None,
        })
    }

    /// Find the tool result for a call id.
    #[must_use]
    pub fn tool_result(&self, tool_call_id: &str) -> Option<&ToolResultPart> {
        self.parts.iter().find_map(|p| match p {
            MessagePart::ToolResult(tr) if tr.tool_call_id == tool_call_id => Some(tr),
            _ => None,
        })
    }

    /// True when every part is a text part whose content trims to empty.
    ///
    /// A message with no parts counts as whitespace-only.
    #[must_use]
    pub fn is_whitespace_only(&self) -> bool {
        self.parts.iter().all(|p| match p {
            MessagePart::Text(t) => t.content.trim().is_empty(),
            _ => false,
        })
    }
}
