//! Protocol event types.
//!
//! Events follow the AG-UI vocabulary for agent-to-frontend streaming:
//! a discriminated union tagged by `type`, every variant carrying a
//! millisecond timestamp. Adapters must emit `TOOL_CALL_START` before any
//! args/end for the same call id, and exactly one of `RUN_FINISHED` or
//! `RUN_ERROR` when a run terminates.

use crate::identifier::now_millis;
use crate::message::{Role, UiMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved CUSTOM event name for client-tool dispatch.
pub const TOOL_INPUT_AVAILABLE: &str = "tool-input-available";

/// Reserved CUSTOM event name for the approval handshake.
pub const APPROVAL_REQUESTED: &str = "approval-requested";

/// Common fields shared by all events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventMeta {
    /// Event timestamp in milliseconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl EventMeta {
    /// Meta stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            timestamp: Some(now_millis()),
        }
    }
}

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Normal stop (end of response).
    Stop,
    /// Maximum token length reached.
    Length,
    /// Content filter triggered.
    ContentFilter,
    /// Tool calls need to be executed.
    ToolCalls,
    /// Error occurred.
    Error,
    /// Other/custom reason.
    Other,
    /// Unknown reason.
    #[default]
    Unknown,
}

/// Error payload of a `RUN_ERROR` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human-readable error message.
    pub message: String,
    /// Optional machine-readable code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorInfo {
    /// Create a new error payload.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Set the error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// A single record on the adapter stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Opens (or re-opens) a text segment on the named message.
    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        /// Target message id.
        #[serde(rename = "messageId")]
        message_id: String,
        /// Message role; always assistant for streamed text.
        role: Role,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Incremental text. `delta` is preferred; `content` is the full
    /// accumulation fallback for adapters that cannot produce deltas.
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        /// Target message id.
        #[serde(rename = "messageId")]
        message_id: String,
        /// The text increment.
        #[serde(skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        /// Full accumulated text so far.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Flushes pending text and force-completes open tool calls on the
    /// message.
    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        /// Target message id.
        #[serde(rename = "messageId")]
        message_id: String,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Opens a tool call. Must precede any args/end for the same id.
    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart {
        /// Unique tool call id.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Name of the tool being invoked.
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Message the call belongs to, when the adapter knows it.
        #[serde(rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        /// Positional index some providers attach; informational only.
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Appends to the call's argument string.
    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs {
        /// Tool call id.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Argument JSON fragment.
        delta: String,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Finalizes the call's arguments. An `input` value overrides the
    /// accumulated parse; a `result` emits a matching tool result.
    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd {
        /// Tool call id.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Authoritative parsed arguments, when provided.
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        /// Server-side execution result, when the tool ran remotely.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Thinking/reasoning update; the single open thinking part is
    /// replaced in place.
    #[serde(rename = "STEP_FINISHED")]
    StepFinished {
        /// Target message id, when the adapter attributes reasoning.
        #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// Reasoning increment.
        #[serde(skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        /// Full reasoning blob (providers that deliver it completed).
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Terminal: run completed.
    #[serde(rename = "RUN_FINISHED")]
    RunFinished {
        /// Why the run stopped.
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
        /// Provider usage metadata, passed through untyped.
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Value>,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Terminal: run failed.
    #[serde(rename = "RUN_ERROR")]
    RunError {
        /// Error detail.
        error: ErrorInfo,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Authoritative replacement of the conversation (durable-session
    /// resume).
    #[serde(rename = "MESSAGES_SNAPSHOT")]
    MessagesSnapshot {
        /// The full conversation.
        messages: Vec<UiMessage>,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },

    /// Out-of-band event; see [`TOOL_INPUT_AVAILABLE`] and
    /// [`APPROVAL_REQUESTED`] for the two reserved names.
    #[serde(rename = "CUSTOM")]
    Custom {
        /// Event name.
        name: String,
        /// Opaque payload.
        data: Value,
        /// Shared event fields.
        #[serde(flatten)]
        meta: EventMeta,
    },
}

impl Event {
    /// Create a text-message-start event.
    #[must_use]
    pub fn text_message_start(message_id: impl Into<String>) -> Self {
        Self::TextMessageStart {
            message_id: message_id.into(),
            role: Role::Assistant,
            meta: EventMeta::now(),
        }
    }

    /// Create a text-message-content event carrying a delta.
    #[must_use]
    pub fn text_message_content(message_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::TextMessageContent {
            message_id: message_id.into(),
            delta: Some(delta.into()),
            content: None,
            meta: EventMeta::now(),
        }
    }

    /// Create a text-message-content event carrying the full accumulation.
    #[must_use]
    pub fn text_message_snapshot(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::TextMessageContent {
            message_id: message_id.into(),
            delta: None,
            content: Some(content.into()),
            meta: EventMeta::now(),
        }
    }

    /// Create a text-message-end event.
    #[must_use]
    pub fn text_message_end(message_id: impl Into<String>) -> Self {
        Self::TextMessageEnd {
            message_id: message_id.into(),
            meta: EventMeta::now(),
        }
    }

    /// Create a tool-call-start event.
    #[must_use]
    pub fn tool_call_start(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self::ToolCallStart {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            parent_message_id: None,
            index: None,
            meta: EventMeta::now(),
        }
    }

    /// Create a tool-call-args event.
    #[must_use]
    pub fn tool_call_args(tool_call_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::ToolCallArgs {
            tool_call_id: tool_call_id.into(),
            delta: delta.into(),
            meta: EventMeta::now(),
        }
    }

    /// Create a tool-call-end event.
    #[must_use]
    pub fn tool_call_end(tool_call_id: impl Into<String>) -> Self {
        Self::ToolCallEnd {
            tool_call_id: tool_call_id.into(),
            input: None,
            result: None,
            meta: EventMeta::now(),
        }
    }

    /// Create a tool-call-end event carrying a server-side result.
    #[must_use]
    pub fn tool_call_result(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::ToolCallEnd {
            tool_call_id: tool_call_id.into(),
            input: None,
            result: Some(result.into()),
            meta: EventMeta::now(),
        }
    }

    /// Create a thinking delta event.
    #[must_use]
    pub fn step_finished(message_id: Option<String>, delta: impl Into<String>) -> Self {
        Self::StepFinished {
            message_id,
            delta: Some(delta.into()),
            content: None,
            meta: EventMeta::now(),
        }
    }

    /// Create a run-finished event.
    #[must_use]
    pub fn run_finished(finish_reason: FinishReason) -> Self {
        Self::RunFinished {
            finish_reason,
            usage: None,
            meta: EventMeta::now(),
        }
    }

    /// Create a run-error event.
    #[must_use]
    pub fn run_error(message: impl Into<String>) -> Self {
        Self::RunError {
            error: ErrorInfo::new(message),
            meta: EventMeta::now(),
        }
    }

    /// Create a messages-snapshot event.
    #[must_use]
    pub fn messages_snapshot(messages: Vec<UiMessage>) -> Self {
        Self::MessagesSnapshot {
            messages,
            meta: EventMeta::now(),
        }
    }

    /// Create a custom event.
    #[must_use]
    pub fn custom(name: impl Into<String>, data: Value) -> Self {
        Self::Custom {
            name: name.into(),
            data,
            meta: EventMeta::now(),
        }
    }

    /// Set the timestamp on this event.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.meta_mut().timestamp = Some(timestamp);
        self
    }

    /// Timestamp in milliseconds, if set.
    #[must_use]
    pub fn timestamp(&self) -> Option<u64> {
        self.meta().timestamp
    }

    /// Check if this event terminates a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. } | Self::RunError { .. })
    }

    fn meta(&self) -> &EventMeta {
        match self {
            Self::TextMessageStart { meta, .. }
            | Self::TextMessageContent { meta, .. }
            | Self::TextMessageEnd { meta, .. }
            | Self::ToolCallStart { meta, .. }
            | Self::ToolCallArgs { meta, .. }
            | Self::ToolCallEnd { meta, .. }
            | Self::StepFinished { meta, .. }
            | Self::RunFinished { meta, .. }
            | Self::RunError { meta, .. }
            | Self::MessagesSnapshot { meta, .. }
            | Self::Custom { meta, .. } => meta,
        }
    }

    fn meta_mut(&mut self) -> &mut EventMeta {
        match self {
            Self::TextMessageStart { meta, .. }
            | Self::TextMessageContent { meta, .. }
            | Self::TextMessageEnd { meta, .. }
            | Self::ToolCallStart { meta, .. }
            | Self::ToolCallArgs { meta, .. }
            | Self::ToolCallEnd { meta, .. }
            | Self::StepFinished { meta, .. }
            | Self::RunFinished { meta, .. }
            | Self::RunError { meta, .. }
            | Self::MessagesSnapshot { meta, .. }
            | Self::Custom { meta, .. } => meta,
        }
    }
}

/// Payload of the reserved `tool-input-available` CUSTOM event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInputPayload {
    /// The call to execute on the client.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Final parsed input.
    pub input: Value,
}

impl ToolInputPayload {
    /// Decode from a CUSTOM event payload, tolerating extra fields.
    #[must_use]
    pub fn from_value(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Approval reference inside an `approval-requested` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRef {
    /// Approval handshake id.
    pub id: String,
    /// Whether approval is required; absent means required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_approval: Option<bool>,
}

/// Payload of the reserved `approval-requested` CUSTOM event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPayload {
    /// The gated tool call.
    pub tool_call_id: String,
    /// Tool name, when the adapter repeats it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Proposed input, when the adapter repeats it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// The approval handshake.
    pub approval: ApprovalRef,
}

impl ApprovalPayload {
    /// Decode from a CUSTOM event payload, tolerating extra fields.
    #[must_use]
    pub fn from_value(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

pub mod legacy {
    //! Compatibility decoder for the older lowercase event vocabulary
    //! (`"text"`, `"tool-call-delta"`, `"done"`, ...). The AG-UI vocabulary
    //! is canonical; these map onto it and are never emitted.

    use super::{Event, FinishReason};
    use serde_json::Value;

    fn str_field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
        keys.iter().find_map(|k| v.get(*k).and_then(Value::as_str))
    }

    /// Map a legacy-vocabulary frame onto the canonical event union.
    ///
    /// Returns `None` for frames that have no canonical counterpart.
    #[must_use]
    pub fn decode(value: &Value) -> Option<Event> {
        let kind = value.get("type").and_then(Value::as_str)?;
        match kind {
            "text" => {
                let message_id = str_field(value, &["messageId"]).unwrap_or_default();
                let delta = str_field(value, &["delta", "content", "text"])?;
                Some(Event::text_message_content(message_id, delta))
            }
            "thinking" | "reasoning" => {
                let message_id = str_field(value, &["messageId"]).map(str::to_string);
                let delta = str_field(value, &["delta", "content", "text"])?;
                Some(Event::step_finished(message_id, delta))
            }
            "tool-call" => {
                let id = str_field(value, &["toolCallId", "id"])?;
                let name = str_field(value, &["toolName", "name"])?;
                Some(Event::tool_call_start(id, name))
            }
            "tool-call-delta" => {
                let id = str_field(value, &["toolCallId", "id"])?;
                let delta = str_field(value, &["argsTextDelta", "delta"])?;
                Some(Event::tool_call_args(id, delta))
            }
            "tool-call-end" => {
                let id = str_field(value, &["toolCallId", "id"])?;
                Some(Event::tool_call_end(id))
            }
            "tool-result" => {
                let id = str_field(value, &["toolCallId", "id"])?;
                let result = value
                    .get("result")
                    .map(|r| match r {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                Some(Event::tool_call_result(id, result))
            }
            "done" => Some(Event::run_finished(FinishReason::Stop)),
            "error" => {
                let message = str_field(value, &["error", "message"]).unwrap_or("unknown error");
                Some(Event::run_error(message))
            }
            _ => None,
        }
    }
}
