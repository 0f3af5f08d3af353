//! Host-facing notifications.

use chatflow_core::message::{ToolCallState, UiMessage};
use chatflow_processor::{ApprovalRequest, ToolCallRequest};
use serde_json::Value;

/// Where the client is in its submission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatStatus {
    /// Idle; ready to submit.
    #[default]
    Ready,
    /// A request has been submitted; no content yet.
    Submitted,
    /// Response content is streaming in.
    Streaming,
    /// The last run ended in an error.
    Error,
}

/// Receiver for client lifecycle notifications.
///
/// All methods default to no-ops; implement the ones the host cares
/// about. Handlers are called outside the client's internal locks, so
/// they may call back into the client.
pub trait ChatHandler: Send + Sync {
    /// The conversation changed; `messages` is a fresh snapshot.
    fn on_messages_change(&self, _messages: &[UiMessage]) {}

    /// The submission status changed.
    fn on_status_change(&self, _status: ChatStatus) {}

    /// A run ended in an error. Not called for user cancellation.
    fn on_error(&self, _message: &str) {}

    /// A stream delivered its first chunk.
    fn on_stream_start(&self) {}

    /// A stream finalized; carries the completed assistant message.
    fn on_stream_end(&self, _message: Option<&UiMessage>) {}

    /// A text segment grew.
    fn on_text_update(&self, _message_id: &str, _content: &str) {}

    /// Thinking content changed.
    fn on_thinking_update(&self, _message_id: &str, _content: &str) {}

    /// A tool call advanced.
    fn on_tool_call_state_change(
        &self,
        _message_id: &str,
        _tool_call_id: &str,
        _state: ToolCallState,
        _arguments: &Value,
    ) {
    }

    /// A client tool is ready to execute. The client runs registered
    /// tools itself; this is informational, or the host's cue to call
    /// `add_tool_result` for tools it executes out of band.
    fn on_tool_call(&self, _request: &ToolCallRequest) {}

    /// A tool call awaits the user's decision; respond via
    /// `add_tool_approval_response`.
    fn on_approval_request(&self, _request: &ApprovalRequest) {}
}

/// Handler that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ChatHandler for NoopHandler {}
