//! Pure message-list mutators.
//!
//! Each function applies a single logical change to a message list and
//! returns a new list; the input is never mutated. Callers treat message
//! lists as immutable snapshots. Every function is total (targets that
//! don't exist leave the list unchanged) and idempotent on equal inputs.

use chatflow_core::message::{
    MessagePart, TextPart, ThinkingPart, ToolApproval, ToolCallPart, ToolCallState,
    ToolResultPart, ToolResultState, UiMessage,
};
use serde_json::Value;

fn with_message<F>(messages: &[UiMessage], message_id: &str, mut mutate: F) -> Vec<UiMessage>
where
    F: FnMut(&mut UiMessage),
{
    messages
        .iter()
        .map(|m| {
            if m.id == message_id {
                let mut updated = m.clone();
                mutate(&mut updated);
                updated
            } else {
                m.clone()
            }
        })
        .collect()
}

/// Replace the content of the target message's trailing text part, or push
/// a new text part when the last part is not text.
///
/// This is what keeps text segments contiguous: text extends in place
/// until a non-text part intervenes, after which a fresh part begins.
#[must_use]
pub fn update_text_part(messages: &[UiMessage], message_id: &str, content: &str) -> Vec<UiMessage> {
    with_message(messages, message_id, |message| {
        match message.parts.last_mut() {
            Some(MessagePart::Text(text)) => text.content = content.to_string(),
            _ => message.parts.push(MessagePart::Text(TextPart::new(content))),
        }
    })
}

/// Replace the latest thinking part in place, or push one when absent.
#[must_use]
pub fn update_thinking_part(
    messages: &[UiMessage],
    message_id: &str,
    content: &str,
) -> Vec<UiMessage> {
    with_message(messages, message_id, |message| {
        let latest = message
            .parts
            .iter_mut()
            .rev()
            .find_map(|p| match p {
                MessagePart::Thinking(t) => Some(t),
                _ => None,
            });
        match latest {
            Some(thinking) => thinking.content = content.to_string(),
            None => message
                .parts
                .push(MessagePart::Thinking(ThinkingPart::new(content))),
        }
    })
}

/// Upsert a tool call part by call id.
///
/// An existing part keeps its approval metadata and output; name,
/// arguments and state are taken from `part`. State never regresses.
#[must_use]
pub fn update_tool_call_part(
    messages: &[UiMessage],
    message_id: &str,
    part: &ToolCallPart,
) -> Vec<UiMessage> {
    with_message(messages, message_id, |message| {
        let existing = message.parts.iter_mut().find_map(|p| match p {
            MessagePart::ToolCall(tc) if tc.id == part.id => Some(tc),
            _ => None,
        });
        match existing {
            Some(tc) => {
                tc.name = part.name.clone();
                tc.arguments = part.arguments.clone();
                if tc.state.can_advance_to(part.state) {
                    tc.state = part.state;
                }
                if part.approval.is_some() {
                    tc.approval = part.approval.clone();
                }
                if part.output.is_some() {
                    tc.output = part.output.clone();
                }
            }
            None => message.parts.push(MessagePart::ToolCall(part.clone())),
        }
    })
}

/// Set the output on the tool call with the given id, wherever it lives.
#[must_use]
pub fn update_tool_call_with_output(
    messages: &[UiMessage],
    tool_call_id: &str,
    output: &Value,
    state: Option<ToolCallState>,
) -> Vec<UiMessage> {
    messages
        .iter()
        .map(|m| {
            let mut updated = m.clone();
            for part in &mut updated.parts {
                if let MessagePart::ToolCall(tc) = part {
                    if tc.id == tool_call_id {
                        tc.output = Some(output.clone());
                        if let Some(state) = state {
                            if tc.state.can_advance_to(state) {
                                tc.state = state;
                            }
                        }
                    }
                }
            }
            updated
        })
        .collect()
}

/// Attach approval metadata to a tool call and move it to the
/// approval-requested state.
#[must_use]
pub fn update_tool_call_approval(
    messages: &[UiMessage],
    message_id: &str,
    tool_call_id: &str,
    approval_id: &str,
) -> Vec<UiMessage> {
    with_message(messages, message_id, |message| {
        for part in &mut message.parts {
            if let MessagePart::ToolCall(tc) = part {
                if tc.id == tool_call_id {
                    tc.approval = Some(ToolApproval::pending(approval_id));
                    if tc.state.can_advance_to(ToolCallState::ApprovalRequested) {
                        tc.state = ToolCallState::ApprovalRequested;
                    }
                }
            }
        }
    })
}

/// Record the user's approval decision on the call carrying the given
/// approval id. Unknown approval ids leave the list unchanged.
#[must_use]
pub fn update_tool_call_approval_response(
    messages: &[UiMessage],
    approval_id: &str,
    approved: bool,
) -> Vec<UiMessage> {
    messages
        .iter()
        .map(|m| {
            let mut updated = m.clone();
            for part in &mut updated.parts {
                if let MessagePart::ToolCall(tc) = part {
                    if tc.approval.as_ref().is_some_and(|a| a.id == approval_id) {
                        if let Some(approval) = &mut tc.approval {
                            approval.approved = Some(approved);
                        }
                        if tc.state.can_advance_to(ToolCallState::ApprovalResponded) {
                            tc.state = ToolCallState::ApprovalResponded;
                        }
                    }
                }
            }
            updated
        })
        .collect()
}

/// Upsert a tool result part on the owning message.
///
/// A result must reference an existing tool call in the same message;
/// otherwise the list is returned unchanged.
#[must_use]
pub fn update_tool_result_part(
    messages: &[UiMessage],
    message_id: &str,
    tool_call_id: &str,
    content: &str,
    state: ToolResultState,
    error: Option<&str>,
) -> Vec<UiMessage> {
    with_message(messages, message_id, |message| {
        if message.tool_call(tool_call_id).is_none() {
            return;
        }
        let existing = message.parts.iter_mut().find_map(|p| match p {
            MessagePart::ToolResult(tr) if tr.tool_call_id == tool_call_id => Some(tr),
            _ => None,
        });
        match existing {
            Some(tr) => {
                tr.content = content.to_string();
                tr.state = state;
                tr.error = error.map(str::to_string);
            }
            None => message.parts.push(MessagePart::ToolResult(ToolResultPart {
                tool_call_id: tool_call_id.to_string(),
                content: content.to_string(),
                state,
                error: error.map(str::to_string),
            })),
        }
    })
}
