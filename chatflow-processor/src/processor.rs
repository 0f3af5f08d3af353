//! The stream-processing state machine.
//!
//! [`StreamProcessor`] consumes protocol events one at a time and folds
//! them into an ordered conversation of [`UiMessage`]s, tracking text
//! segments, parallel tool calls and approval handshakes. Processing a
//! chunk is synchronous and never fails: protocol violations (orphan
//! args, duplicate starts, unknown custom names) are recovered locally.
//!
//! Each `process_chunk` call returns the lifecycle updates it produced;
//! the owner (typically a chat client) forwards them to its host.

use crate::emission::{EmitStrategy, Immediate};
use crate::mutators;
use chatflow_core::events::{
    ApprovalPayload, Event, FinishReason, ToolInputPayload, APPROVAL_REQUESTED,
    TOOL_INPUT_AVAILABLE,
};
use chatflow_core::identifier::generate_message_id;
use chatflow_core::message::{
    MessagePart, Role, ToolCallPart, ToolCallState, ToolResultState, UiMessage,
};
use chatflow_core::model::{ModelContent, ModelMessage, ModelRole, ModelToolCall};
use chatflow_core::partial_json::parse_partial;
use chatflow_core::message::{ContentKind, ContentPart, ContentSource, SourceKind};
use futures::{Stream, StreamExt};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// A client-tool invocation surfaced to the host for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Owning message id (empty when the call cannot be routed).
    pub message_id: String,
    /// Tool call id.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Final parsed input.
    pub input: Value,
}

/// An approval handshake surfaced to the host for a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    /// Owning message id.
    pub message_id: String,
    /// The gated tool call.
    pub tool_call_id: String,
    /// Tool name, when known.
    pub tool_name: Option<String>,
    /// Approval handshake id; pass back via `add_tool_approval_response`.
    pub approval_id: String,
    /// Proposed input, when the adapter repeated it.
    pub input: Option<Value>,
}

/// Lifecycle notification produced by [`StreamProcessor::process_chunk`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorUpdate {
    /// The message list changed; fetch a snapshot via `get_messages`.
    MessagesChanged,
    /// First chunk of a stream arrived.
    StreamStarted,
    /// The stream finalized; carries the completed assistant message.
    StreamEnded {
        /// The assistant message the stream produced, if any survived.
        message: Option<UiMessage>,
    },
    /// A terminal error was reported.
    ErrorOccurred {
        /// Error message.
        message: String,
        /// Optional machine-readable code.
        code: Option<String>,
    },
    /// A text segment grew.
    TextUpdated {
        /// Owning message.
        message_id: String,
        /// Current segment content.
        content: String,
    },
    /// Thinking content changed.
    ThinkingUpdated {
        /// Owning message.
        message_id: String,
        /// Full thinking content.
        content: String,
    },
    /// A tool call advanced (or refreshed its argument preview).
    ToolCallStateChanged {
        /// Owning message.
        message_id: String,
        /// Tool call id.
        tool_call_id: String,
        /// Current state.
        state: ToolCallState,
        /// Best-effort parsed arguments.
        arguments: Value,
    },
    /// A client-executed tool is ready to run.
    ToolCallReady(ToolCallRequest),
    /// A tool call awaits the user's approval.
    ApprovalRequested(ApprovalRequest),
}

/// Final outcome of one processed stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorResult {
    /// Finish reason from the terminal event, if one arrived.
    pub finish_reason: Option<FinishReason>,
    /// Terminal error message, if the run errored.
    pub error: Option<String>,
    /// Provider usage metadata from `RUN_FINISHED`, untouched.
    pub usage: Option<Value>,
    /// Number of messages in the conversation at finalization.
    pub message_count: usize,
}

#[derive(Debug, Clone)]
struct InternalToolCall {
    name: String,
    arguments: String,
    state: ToolCallState,
}

#[derive(Debug, Clone, Default)]
struct MessageStreamState {
    total_text_content: String,
    current_segment_text: String,
    last_emitted_text: String,
    thinking_content: String,
    tool_calls: HashMap<String, InternalToolCall>,
    tool_call_order: Vec<String>,
    has_tool_calls_since_text_start: bool,
    is_complete: bool,
}

/// Deterministic state machine from event stream to conversation.
pub struct StreamProcessor {
    messages: Vec<UiMessage>,
    states: HashMap<String, MessageStreamState>,
    active_message_ids: IndexSet<String>,
    tool_call_to_message: HashMap<String, String>,
    pending_manual_message_id: Option<String>,
    last_prepared_id: Option<String>,
    finish_reason: Option<FinishReason>,
    usage: Option<Value>,
    has_error: bool,
    last_error: Option<String>,
    is_done: bool,
    stream_started: bool,
    emit_strategy: Box<dyn EmitStrategy>,
    recording: Option<Vec<Event>>,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamProcessor {
    /// Create a processor that flushes text immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_emit_strategy(Box::new(Immediate))
    }

    /// Create a processor with a custom emission strategy.
    #[must_use]
    pub fn with_emit_strategy(emit_strategy: Box<dyn EmitStrategy>) -> Self {
        Self {
            messages: Vec::new(),
            states: HashMap::new(),
            active_message_ids: IndexSet::new(),
            tool_call_to_message: HashMap::new(),
            pending_manual_message_id: None,
            last_prepared_id: None,
            finish_reason: None,
            usage: None,
            has_error: false,
            last_error: None,
            is_done: false,
            stream_started: false,
            emit_strategy,
            recording: None,
        }
    }

    /// Borrow the current message list.
    #[must_use]
    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    /// Snapshot of the current message list.
    #[must_use]
    pub fn get_messages(&self) -> Vec<UiMessage> {
        self.messages.clone()
    }

    /// Whether the current stream has finalized.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_done
    }

    /// The outcome of the most recent stream.
    #[must_use]
    pub fn result(&self) -> ProcessorResult {
        ProcessorResult {
            finish_reason: self.finish_reason,
            error: self.last_error.clone(),
            usage: self.usage.clone(),
            message_count: self.messages.len(),
        }
    }

    /// Replace the conversation wholesale, rebuilding routing state.
    pub fn set_messages(&mut self, messages: Vec<UiMessage>) -> Vec<ProcessorUpdate> {
        self.messages = messages;
        self.states.clear();
        self.active_message_ids.clear();
        self.pending_manual_message_id = None;
        self.rebuild_tool_routes();
        vec![ProcessorUpdate::MessagesChanged]
    }

    /// Remove every message.
    pub fn clear_messages(&mut self) -> Vec<ProcessorUpdate> {
        self.set_messages(Vec::new())
    }

    /// Append a user message. The processor never creates user messages
    /// on its own.
    pub fn add_user_message(&mut self, message: UiMessage) -> Vec<ProcessorUpdate> {
        self.messages.push(message);
        vec![ProcessorUpdate::MessagesChanged]
    }

    /// Reserve the next assistant message without creating it.
    ///
    /// No message is pushed until the first content-bearing event
    /// arrives, which keeps auto-continuations that produce no content
    /// from flashing an empty message. Returns the reserved id, which is
    /// rebound to the server's id when `TEXT_MESSAGE_START` names one.
    pub fn prepare_assistant_message(&mut self) -> String {
        let id = generate_message_id();
        self.prepare_with_id(id.clone());
        id
    }

    pub(crate) fn prepare_with_id(&mut self, id: String) {
        self.pending_manual_message_id = Some(id.clone());
        self.last_prepared_id = Some(id);
        self.finish_reason = None;
        self.usage = None;
        self.has_error = false;
        self.last_error = None;
        self.is_done = false;
        self.stream_started = false;
        self.active_message_ids.clear();
        self.emit_strategy.reset();
    }

    pub(crate) fn last_prepared_id(&self) -> Option<&str> {
        self.last_prepared_id.as_deref()
    }

    /// Capture every subsequent input event for deterministic replay.
    pub fn start_recording(&mut self) {
        self.recording = Some(Vec::new());
    }

    pub(crate) fn recorded_events(&self) -> Option<&[Event]> {
        self.recording.as_deref()
    }

    /// Reset the processor to its initial state, keeping the strategy.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.states.clear();
        self.active_message_ids.clear();
        self.tool_call_to_message.clear();
        self.pending_manual_message_id = None;
        self.last_prepared_id = None;
        self.finish_reason = None;
        self.usage = None;
        self.has_error = false;
        self.last_error = None;
        self.is_done = false;
        self.stream_started = false;
        self.recording = None;
        self.emit_strategy.reset();
    }

    /// Drive the processor from an event stream to completion.
    pub async fn process<S>(&mut self, stream: S) -> ProcessorResult
    where
        S: Stream<Item = Event>,
    {
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            let _ = self.process_chunk(event);
        }
        if !self.is_done {
            let _ = self.finalize_stream();
        }
        self.result()
    }

    /// Apply one event. Synchronous, total, never fails.
    pub fn process_chunk(&mut self, event: Event) -> Vec<ProcessorUpdate> {
        if self.is_done {
            // Exactly one terminal event per run; anything after it is a
            // protocol violation and is dropped.
            debug!("dropping event after stream finalization");
            return Vec::new();
        }
        if let Some(recording) = &mut self.recording {
            recording.push(event.clone());
        }

        let mut updates = Vec::new();
        let mut changed = false;
        if !self.stream_started {
            self.stream_started = true;
            updates.push(ProcessorUpdate::StreamStarted);
        }

        match event {
            Event::TextMessageStart {
                message_id, role, ..
            } => self.handle_text_start(&message_id, role, &mut updates, &mut changed),
            Event::TextMessageContent {
                message_id,
                delta,
                content,
                ..
            } => self.handle_text_content(&message_id, delta, content, &mut updates, &mut changed),
            Event::TextMessageEnd { message_id, .. } => {
                self.handle_text_end(&message_id, &mut updates, &mut changed);
            }
            Event::ToolCallStart {
                tool_call_id,
                tool_name,
                parent_message_id,
                ..
            } => self.handle_tool_start(
                tool_call_id,
                tool_name,
                parent_message_id,
                &mut updates,
                &mut changed,
            ),
            Event::ToolCallArgs {
                tool_call_id,
                delta,
                ..
            } => self.handle_tool_args(&tool_call_id, &delta, &mut updates, &mut changed),
            Event::ToolCallEnd {
                tool_call_id,
                input,
                result,
                ..
            } => self.handle_tool_end(&tool_call_id, input, result, &mut updates, &mut changed),
            Event::StepFinished {
                message_id,
                delta,
                content,
                ..
            } => self.handle_step_finished(message_id, delta, content, &mut updates, &mut changed),
            Event::RunFinished {
                finish_reason,
                usage,
                ..
            } => {
                self.finish_reason = Some(finish_reason);
                self.usage = usage;
                self.finalize_inner(&mut updates, &mut changed);
            }
            Event::RunError { error, .. } => {
                self.has_error = true;
                self.last_error = Some(error.message.clone());
                updates.push(ProcessorUpdate::ErrorOccurred {
                    message: error.message,
                    code: error.code,
                });
                self.finalize_inner(&mut updates, &mut changed);
            }
            Event::MessagesSnapshot { messages, .. } => {
                self.messages = messages;
                self.states.clear();
                self.active_message_ids.clear();
                self.pending_manual_message_id = None;
                self.rebuild_tool_routes();
                changed = true;
            }
            Event::Custom { name, data, .. } => {
                self.handle_custom(&name, data, &mut updates, &mut changed);
            }
        }

        commit_changes(&mut updates, &mut changed);
        updates
    }

    /// Flush pending text, force-complete tool calls, prune
    /// whitespace-only output and mark the stream done. Idempotent.
    pub fn finalize_stream(&mut self) -> Vec<ProcessorUpdate> {
        let mut updates = Vec::new();
        let mut changed = false;
        self.finalize_inner(&mut updates, &mut changed);
        commit_changes(&mut updates, &mut changed);
        updates
    }

    /// Record the outcome of a client-executed tool call.
    pub fn add_tool_result(
        &mut self,
        tool_call_id: &str,
        output: Value,
        state: ToolResultState,
        error: Option<String>,
    ) -> Vec<ProcessorUpdate> {
        let Some(message_id) = self.owning_message_of(tool_call_id) else {
            debug!(tool_call_id, "tool result for unknown call dropped");
            return Vec::new();
        };
        let content = match &output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.messages =
            mutators::update_tool_call_with_output(&self.messages, tool_call_id, &output, None);
        self.messages = mutators::update_tool_result_part(
            &self.messages,
            &message_id,
            tool_call_id,
            &content,
            state,
            error.as_deref(),
        );
        vec![ProcessorUpdate::MessagesChanged]
    }

    /// Record the user's decision for an approval handshake.
    ///
    /// Unknown approval ids are a no-op.
    pub fn add_tool_approval_response(
        &mut self,
        approval_id: &str,
        approved: bool,
    ) -> Vec<ProcessorUpdate> {
        let target = self.messages.iter().find_map(|m| {
            m.parts.iter().find_map(|p| match p {
                MessagePart::ToolCall(tc)
                    if tc.approval.as_ref().is_some_and(|a| a.id == approval_id) =>
                {
                    Some((m.id.clone(), tc.id.clone()))
                }
                _ => None,
            })
        });
        let Some((message_id, tool_call_id)) = target else {
            debug!(approval_id, "approval response for unknown id dropped");
            return Vec::new();
        };

        self.messages =
            mutators::update_tool_call_approval_response(&self.messages, approval_id, approved);
        if let Some(state) = self.states.get_mut(&message_id) {
            if let Some(call) = state.tool_calls.get_mut(&tool_call_id) {
                if call.state.can_advance_to(ToolCallState::ApprovalResponded) {
                    call.state = ToolCallState::ApprovalResponded;
                }
            }
        }

        let arguments = self
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .and_then(|m| m.tool_call(&tool_call_id))
            .map(|tc| parse_partial(&tc.arguments))
            .unwrap_or(Value::Null);
        vec![
            ProcessorUpdate::ToolCallStateChanged {
                message_id,
                tool_call_id,
                state: ToolCallState::ApprovalResponded,
                arguments,
            },
            ProcessorUpdate::MessagesChanged,
        ]
    }

    /// Drop every message after the one with the given id.
    pub fn remove_messages_after(&mut self, message_id: &str) -> Vec<ProcessorUpdate> {
        let Some(pos) = self.messages.iter().position(|m| m.id == message_id) else {
            return Vec::new();
        };
        if pos + 1 >= self.messages.len() {
            return Vec::new();
        }
        let removed = self.messages.split_off(pos + 1);
        for message in &removed {
            self.states.remove(&message.id);
            self.active_message_ids.shift_remove(&message.id);
        }
        let removed_ids: Vec<String> = removed.into_iter().map(|m| m.id).collect();
        self.tool_call_to_message
            .retain(|_, owner| !removed_ids.contains(owner));
        vec![ProcessorUpdate::MessagesChanged]
    }

    /// True when every tool call in the conversation is resolved: its
    /// input is final and it carries an output, owns a result, or has an
    /// approval decision.
    #[must_use]
    pub fn are_all_tools_complete(&self) -> bool {
        self.messages.iter().all(|message| {
            message.parts.iter().all(|part| match part {
                MessagePart::ToolCall(tc) => match tc.state {
                    ToolCallState::AwaitingInput
                    | ToolCallState::InputStreaming
                    | ToolCallState::ApprovalRequested => false,
                    ToolCallState::InputComplete => {
                        tc.output.is_some() || message.tool_result(&tc.id).is_some()
                    }
                    ToolCallState::ApprovalResponded => true,
                },
                _ => true,
            })
        })
    }

    /// Project the conversation into the model round-trip shape.
    ///
    /// Thinking parts never reach the model; each tool result spawns a
    /// `role=tool` message keyed by its call id.
    #[must_use]
    pub fn to_model_messages(&self) -> Vec<ModelMessage> {
        let mut out = Vec::new();
        for message in &self.messages {
            match message.role {
                Role::User => out.push(user_model_message(message)),
                Role::System => out.push(ModelMessage::text(
                    ModelRole::System,
                    message.text_content(),
                )),
                Role::Assistant => {
                    let tool_calls: Vec<ModelToolCall> = message
                        .parts
                        .iter()
                        .filter_map(|p| match p {
                            MessagePart::ToolCall(tc) => Some(ModelToolCall {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                arguments: parse_partial(&tc.arguments),
                            }),
                            _ => None,
                        })
                        .collect();
                    let text = message.text_content();
                    if !text.is_empty() || !tool_calls.is_empty() {
                        let mut assistant = ModelMessage::text(ModelRole::Assistant, text);
                        if !tool_calls.is_empty() {
                            assistant.tool_calls = Some(tool_calls);
                        }
                        out.push(assistant);
                    }
                    for part in &message.parts {
                        if let MessagePart::ToolResult(tr) = part {
                            out.push(ModelMessage::tool(&tr.tool_call_id, &tr.content));
                        }
                    }
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    fn handle_text_start(
        &mut self,
        message_id: &str,
        role: Role,
        _updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        if role != Role::Assistant {
            debug!(?role, "ignoring TEXT_MESSAGE_START with non-assistant role");
            return;
        }
        // Rebind a manually reserved id to the server's canonical one.
        if let Some(pending) = self.pending_manual_message_id.take() {
            if pending != message_id
                && self.messages.iter().any(|m| m.id == pending)
                && !self.messages.iter().any(|m| m.id == message_id)
            {
                self.rebind_message(&pending, message_id);
                *changed = true;
            }
        }
        self.ensure_assistant_message(Some(message_id), changed);
    }

    fn handle_text_content(
        &mut self,
        message_id: &str,
        delta: Option<String>,
        content: Option<String>,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        if delta.as_deref().map_or(true, str::is_empty) && content.is_none() {
            return;
        }
        let explicit = (!message_id.is_empty()).then_some(message_id);
        let id = self.ensure_assistant_message(explicit, changed);

        let increment = {
            let Some(state) = self.states.get_mut(&id) else {
                return;
            };

            // A tool call closed the previous segment; new text starts a
            // fresh one (and a fresh TextPart, since the tool parts now
            // trail the old segment).
            if state.has_tool_calls_since_text_start {
                let is_new_text = delta.as_deref().is_some_and(|d| !d.is_empty())
                    || content
                        .as_deref()
                        .is_some_and(|c| c != state.current_segment_text);
                if is_new_text {
                    state.current_segment_text.clear();
                    state.last_emitted_text.clear();
                    state.has_tool_calls_since_text_start = false;
                }
            }

            // Prefer deltas; reconcile full-content fallbacks against the
            // accumulated segment.
            let increment: Option<String> = match (&delta, &content) {
                (Some(d), _) if !d.is_empty() => {
                    state.current_segment_text.push_str(d);
                    Some(d.clone())
                }
                (_, Some(c)) => {
                    let current = &state.current_segment_text;
                    if c == current || (c.len() < current.len() && current.starts_with(c.as_str()))
                    {
                        None
                    } else if c.starts_with(current.as_str()) {
                        let inc = c[current.len()..].to_string();
                        state.current_segment_text = c.clone();
                        Some(inc)
                    } else {
                        // Misbehaving adapter; append rather than lose text.
                        state.current_segment_text.push_str(c);
                        Some(c.clone())
                    }
                }
                _ => None,
            };
            if let Some(inc) = &increment {
                state.total_text_content.push_str(inc);
            }
            increment
        };

        if let Some(inc) = increment {
            let segment = self
                .states
                .get(&id)
                .map(|s| s.current_segment_text.clone())
                .unwrap_or_default();
            if self.emit_strategy.should_emit(&inc, &segment) {
                self.flush_text(&id, updates, changed);
            }
        }
    }

    fn handle_text_end(
        &mut self,
        message_id: &str,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        if !self.states.contains_key(message_id) {
            return;
        }
        self.flush_text(message_id, updates, changed);
        self.complete_tool_calls_on(message_id, updates, changed);
    }

    fn handle_tool_start(
        &mut self,
        tool_call_id: String,
        tool_name: String,
        parent_message_id: Option<String>,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        if self.tool_call_to_message.contains_key(&tool_call_id) {
            debug!(tool_call_id, "duplicate TOOL_CALL_START dropped");
            return;
        }
        let message_id =
            self.ensure_assistant_message(parent_message_id.as_deref(), changed);
        self.flush_text(&message_id, updates, changed);

        if let Some(state) = self.states.get_mut(&message_id) {
            state.tool_calls.insert(
                tool_call_id.clone(),
                InternalToolCall {
                    name: tool_name.clone(),
                    arguments: String::new(),
                    state: ToolCallState::AwaitingInput,
                },
            );
            state.tool_call_order.push(tool_call_id.clone());
            state.has_tool_calls_since_text_start = true;
        }
        self.tool_call_to_message
            .insert(tool_call_id.clone(), message_id.clone());

        self.messages = mutators::update_tool_call_part(
            &self.messages,
            &message_id,
            &ToolCallPart::new(&tool_call_id, &tool_name),
        );
        *changed = true;
        updates.push(ProcessorUpdate::ToolCallStateChanged {
            message_id,
            tool_call_id,
            state: ToolCallState::AwaitingInput,
            arguments: Value::Null,
        });
    }

    fn handle_tool_args(
        &mut self,
        tool_call_id: &str,
        delta: &str,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        let Some(message_id) = self.tool_call_to_message.get(tool_call_id).cloned() else {
            debug!(tool_call_id, "orphan TOOL_CALL_ARGS dropped");
            return;
        };
        let Some((part, preview, state_now)) = ({
            self.states
                .get_mut(&message_id)
                .and_then(|s| s.tool_calls.get_mut(tool_call_id))
                .and_then(|call| {
                    if call.state.rank() >= ToolCallState::InputComplete.rank() {
                        debug!(tool_call_id, "TOOL_CALL_ARGS after completion dropped");
                        return None;
                    }
                    call.arguments.push_str(delta);
                    if call.state == ToolCallState::AwaitingInput && !delta.is_empty() {
                        call.state = ToolCallState::InputStreaming;
                    }
                    let part = ToolCallPart::new(tool_call_id, &call.name)
                        .with_arguments(&call.arguments)
                        .with_state(call.state);
                    Some((part, parse_partial(&call.arguments), call.state))
                })
        }) else {
            return;
        };

        self.messages = mutators::update_tool_call_part(&self.messages, &message_id, &part);
        *changed = true;
        updates.push(ProcessorUpdate::ToolCallStateChanged {
            message_id,
            tool_call_id: tool_call_id.to_string(),
            state: state_now,
            arguments: preview,
        });
    }

    fn handle_tool_end(
        &mut self,
        tool_call_id: &str,
        input: Option<Value>,
        result: Option<String>,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        let Some(message_id) = self.tool_call_to_message.get(tool_call_id).cloned() else {
            debug!(tool_call_id, "orphan TOOL_CALL_END dropped");
            return;
        };
        let Some((part, parsed, state_now)) = ({
            self.states
                .get_mut(&message_id)
                .and_then(|s| s.tool_calls.get_mut(tool_call_id))
                .map(|call| {
                    let parsed = match &input {
                        // An explicit input overrides the accumulated parse.
                        Some(value) => {
                            call.arguments =
                                serde_json::to_string(value).unwrap_or_default();
                            value.clone()
                        }
                        None => serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| parse_partial(&call.arguments)),
                    };
                    if call.state.can_advance_to(ToolCallState::InputComplete) {
                        call.state = ToolCallState::InputComplete;
                    }
                    let part = ToolCallPart::new(tool_call_id, &call.name)
                        .with_arguments(&call.arguments)
                        .with_state(call.state);
                    (part, parsed, call.state)
                })
        }) else {
            return;
        };

        self.messages = mutators::update_tool_call_part(&self.messages, &message_id, &part);
        if let Some(result) = result {
            self.messages = mutators::update_tool_call_with_output(
                &self.messages,
                tool_call_id,
                &Value::String(result.clone()),
                None,
            );
            self.messages = mutators::update_tool_result_part(
                &self.messages,
                &message_id,
                tool_call_id,
                &result,
                ToolResultState::Complete,
                None,
            );
        }
        *changed = true;
        updates.push(ProcessorUpdate::ToolCallStateChanged {
            message_id,
            tool_call_id: tool_call_id.to_string(),
            state: state_now,
            arguments: parsed,
        });
    }

    fn handle_step_finished(
        &mut self,
        message_id: Option<String>,
        delta: Option<String>,
        content: Option<String>,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        if delta.is_none() && content.is_none() {
            return;
        }
        let id = self.ensure_assistant_message(message_id.as_deref(), changed);
        let thinking = {
            let Some(state) = self.states.get_mut(&id) else {
                return;
            };
            match (delta, content) {
                (Some(d), _) if !d.is_empty() => state.thinking_content.push_str(&d),
                // Some providers deliver reasoning as one completed blob.
                (_, Some(c)) => state.thinking_content = c,
                _ => {}
            }
            state.thinking_content.clone()
        };

        self.messages = mutators::update_thinking_part(&self.messages, &id, &thinking);
        *changed = true;
        updates.push(ProcessorUpdate::ThinkingUpdated {
            message_id: id,
            content: thinking,
        });
    }

    fn handle_custom(
        &mut self,
        name: &str,
        data: Value,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        match name {
            TOOL_INPUT_AVAILABLE => {
                let Some(payload) = ToolInputPayload::from_value(&data) else {
                    debug!("malformed tool-input-available payload dropped");
                    return;
                };
                let message_id = self
                    .owning_message_of(&payload.tool_call_id)
                    .unwrap_or_default();
                updates.push(ProcessorUpdate::ToolCallReady(ToolCallRequest {
                    message_id,
                    tool_call_id: payload.tool_call_id,
                    tool_name: payload.tool_name,
                    input: payload.input,
                }));
            }
            APPROVAL_REQUESTED => {
                let Some(payload) = ApprovalPayload::from_value(&data) else {
                    debug!("malformed approval-requested payload dropped");
                    return;
                };
                let Some(message_id) = self.owning_message_of(&payload.tool_call_id) else {
                    debug!(
                        tool_call_id = %payload.tool_call_id,
                        "approval request for unknown call dropped"
                    );
                    return;
                };
                self.messages = mutators::update_tool_call_approval(
                    &self.messages,
                    &message_id,
                    &payload.tool_call_id,
                    &payload.approval.id,
                );
                if let Some(state) = self.states.get_mut(&message_id) {
                    if let Some(call) = state.tool_calls.get_mut(&payload.tool_call_id) {
                        if call.state.can_advance_to(ToolCallState::ApprovalRequested) {
                            call.state = ToolCallState::ApprovalRequested;
                        }
                    }
                }
                *changed = true;
                updates.push(ProcessorUpdate::ToolCallStateChanged {
                    message_id: message_id.clone(),
                    tool_call_id: payload.tool_call_id.clone(),
                    state: ToolCallState::ApprovalRequested,
                    arguments: payload.input.clone().unwrap_or(Value::Null),
                });
                updates.push(ProcessorUpdate::ApprovalRequested(ApprovalRequest {
                    message_id,
                    tool_call_id: payload.tool_call_id,
                    tool_name: payload.tool_name,
                    approval_id: payload.approval.id,
                    input: payload.input,
                }));
            }
            other => {
                debug!(name = other, "ignoring unknown custom event");
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_assistant_message(&mut self, explicit: Option<&str>, changed: &mut bool) -> String {
        let id = match explicit {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                if let Some(last) = self.active_message_ids.last() {
                    last.clone()
                } else if let Some(pending) = &self.pending_manual_message_id {
                    pending.clone()
                } else {
                    generate_message_id()
                }
            }
        };
        if !self.messages.iter().any(|m| m.id == id) {
            // Streamed messages carry no local timestamp; their timing
            // comes from the events themselves, which keeps replays
            // byte-identical.
            self.messages.push(UiMessage {
                id: id.clone(),
                role: Role::Assistant,
                parts: Vec::new(),
                created_at: None,
            });
            *changed = true;
        }
        self.states.entry(id.clone()).or_default();
        self.active_message_ids.insert(id.clone());
        id
    }

    fn rebind_message(&mut self, old_id: &str, new_id: &str) {
        for message in &mut self.messages {
            if message.id == old_id {
                message.id = new_id.to_string();
            }
        }
        if let Some(state) = self.states.remove(old_id) {
            self.states.insert(new_id.to_string(), state);
        }
        if self.active_message_ids.shift_remove(old_id) {
            self.active_message_ids.insert(new_id.to_string());
        }
        for owner in self.tool_call_to_message.values_mut() {
            if owner == old_id {
                *owner = new_id.to_string();
            }
        }
    }

    fn flush_text(
        &mut self,
        message_id: &str,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        let Some(state) = self.states.get_mut(message_id) else {
            return;
        };
        if state.current_segment_text == state.last_emitted_text {
            return;
        }
        let segment = state.current_segment_text.clone();
        state.last_emitted_text = segment.clone();
        self.messages = mutators::update_text_part(&self.messages, message_id, &segment);
        *changed = true;
        updates.push(ProcessorUpdate::TextUpdated {
            message_id: message_id.to_string(),
            content: segment,
        });
    }

    fn complete_tool_calls_on(
        &mut self,
        message_id: &str,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        let pending: Vec<(String, ToolCallPart, Value)> = {
            let Some(state) = self.states.get_mut(message_id) else {
                return;
            };
            if state.is_complete {
                return;
            }
            let mut pending = Vec::new();
            for id in &state.tool_call_order {
                if let Some(call) = state.tool_calls.get_mut(id) {
                    if call.state.rank() < ToolCallState::InputComplete.rank() {
                        call.state = ToolCallState::InputComplete;
                        let parsed = serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| parse_partial(&call.arguments));
                        let part = ToolCallPart::new(id, &call.name)
                            .with_arguments(&call.arguments)
                            .with_state(call.state);
                        pending.push((id.clone(), part, parsed));
                    }
                }
            }
            pending
        };

        for (tool_call_id, part, parsed) in pending {
            self.messages = mutators::update_tool_call_part(&self.messages, message_id, &part);
            *changed = true;
            updates.push(ProcessorUpdate::ToolCallStateChanged {
                message_id: message_id.to_string(),
                tool_call_id,
                state: ToolCallState::InputComplete,
                arguments: parsed,
            });
        }
    }

    fn complete_all_tool_calls(
        &mut self,
        updates: &mut Vec<ProcessorUpdate>,
        changed: &mut bool,
    ) {
        let active: Vec<String> = self.active_message_ids.iter().cloned().collect();
        for message_id in active {
            self.complete_tool_calls_on(&message_id, updates, changed);
        }
    }

    fn finalize_inner(&mut self, updates: &mut Vec<ProcessorUpdate>, changed: &mut bool) {
        if self.is_done {
            return;
        }
        self.complete_all_tool_calls(updates, changed);

        let active: Vec<String> = self.active_message_ids.iter().cloned().collect();
        for message_id in &active {
            self.flush_text(message_id, updates, changed);
        }

        // Whitespace-only output is dropped, unless an error explains it.
        if !self.has_error {
            if let Some(last) = self.messages.last() {
                if last.role == Role::Assistant && last.is_whitespace_only() {
                    let removed = last.id.clone();
                    self.messages.pop();
                    self.states.remove(&removed);
                    self.active_message_ids.shift_remove(&removed);
                    self.tool_call_to_message
                        .retain(|_, owner| *owner != removed);
                    *changed = true;
                }
            }
        }

        for message_id in &active {
            if let Some(state) = self.states.get_mut(message_id) {
                state.is_complete = true;
            }
        }
        self.pending_manual_message_id = None;
        self.is_done = true;

        commit_changes(updates, changed);
        let message = self
            .messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .cloned();
        updates.push(ProcessorUpdate::StreamEnded { message });
    }

    fn owning_message_of(&self, tool_call_id: &str) -> Option<String> {
        if let Some(owner) = self.tool_call_to_message.get(tool_call_id) {
            return Some(owner.clone());
        }
        self.messages
            .iter()
            .find(|m| m.tool_call(tool_call_id).is_some())
            .map(|m| m.id.clone())
    }

    fn rebuild_tool_routes(&mut self) {
        self.tool_call_to_message.clear();
        for message in &self.messages {
            for part in &message.parts {
                if let MessagePart::ToolCall(tc) = part {
                    self.tool_call_to_message
                        .insert(tc.id.clone(), message.id.clone());
                }
            }
        }
    }
}

fn commit_changes(updates: &mut Vec<ProcessorUpdate>, changed: &mut bool) {
    if *changed {
        updates.push(ProcessorUpdate::MessagesChanged);
        *changed = false;
    }
}

fn user_model_message(message: &UiMessage) -> ModelMessage {
    let has_media = message
        .parts
        .iter()
        .any(|p| matches!(p, MessagePart::Content(_)));
    if !has_media {
        return ModelMessage::text(ModelRole::User, message.text_content());
    }
    let parts: Vec<ContentPart> = message
        .parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::Content(c) => Some(c.clone()),
            MessagePart::Text(t) => Some(ContentPart {
                kind: ContentKind::Text,
                source: ContentSource {
                    kind: SourceKind::Data,
                    value: t.content.clone(),
                    mime_type: None,
                },
            }),
            _ => None,
        })
        .collect();
    ModelMessage {
        role: ModelRole::User,
        content: ModelContent::Parts(parts),
        tool_calls: None,
        tool_call_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_core::message::ToolResultState;
    use serde_json::json;

    fn drive(events: Vec<Event>) -> (StreamProcessor, Vec<ProcessorUpdate>) {
        let mut processor = StreamProcessor::new();
        processor.prepare_assistant_message();
        let mut updates = Vec::new();
        for event in events {
            updates.extend(processor.process_chunk(event));
        }
        (processor, updates)
    }

    #[test]
    fn test_pure_text_stream() {
        // S1: two deltas accumulate into a single text part.
        let (processor, updates) = drive(vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "Hel"),
            Event::text_message_content("m1", "lo"),
            Event::run_finished(FinishReason::Stop),
        ]);

        let messages = processor.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].parts.len(), 1);
        assert_eq!(messages[0].text_content(), "Hello");
        assert!(processor.is_done());
        assert_eq!(processor.result().finish_reason, Some(FinishReason::Stop));

        assert!(matches!(updates.first(), Some(ProcessorUpdate::StreamStarted)));
        assert!(updates
            .iter()
            .any(|u| matches!(u, ProcessorUpdate::StreamEnded { message: Some(m) } if m.id == "m1")));
    }

    #[test]
    fn test_text_tool_text_ordering() {
        // S2: text → tool → text yields two text parts around the call.
        let (processor, _) = drive(vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "A"),
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"x\":1}"),
            Event::tool_call_result("t1", "42"),
            Event::text_message_content("m1", "B"),
            Event::run_finished(FinishReason::Stop),
        ]);

        let message = &processor.messages()[0];
        assert_eq!(message.parts.len(), 4);
        assert!(matches!(&message.parts[0], MessagePart::Text(t) if t.content == "A"));
        let MessagePart::ToolCall(tc) = &message.parts[1] else {
            panic!("expected tool call at index 1, got {:?}", message.parts[1]);
        };
        assert_eq!(tc.name, "get");
        assert_eq!(tc.state, ToolCallState::InputComplete);
        assert_eq!(tc.output, Some(json!("42")));
        let MessagePart::ToolResult(tr) = &message.parts[2] else {
            panic!("expected tool result at index 2");
        };
        assert_eq!(tr.content, "42");
        assert_eq!(tr.state, ToolResultState::Complete);
        assert!(matches!(&message.parts[3], MessagePart::Text(t) if t.content == "B"));
    }

    #[test]
    fn test_parallel_tool_calls() {
        // S3: interleaved args route by id; order follows the starts.
        let (processor, _) = drive(vec![
            Event::tool_call_start("t1", "first"),
            Event::tool_call_start("t2", "second"),
            Event::tool_call_args("t1", "{\"a\":"),
            Event::tool_call_args("t2", "{\"b\":2}"),
            Event::tool_call_args("t1", "1}"),
            Event::tool_call_end("t2"),
            Event::tool_call_end("t1"),
            Event::run_finished(FinishReason::Stop),
        ]);

        let message = &processor.messages()[0];
        let calls: Vec<&ToolCallPart> = message
            .parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[1].id, "t2");
        assert_eq!(calls[0].state, ToolCallState::InputComplete);
        assert_eq!(calls[1].state, ToolCallState::InputComplete);
        assert_eq!(
            serde_json::from_str::<Value>(&calls[0].arguments).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            serde_json::from_str::<Value>(&calls[1].arguments).unwrap(),
            json!({"b": 2})
        );
    }

    #[test]
    fn test_whitespace_only_message_pruned() {
        // S6: a newline-only body disappears at finalization.
        let (processor, _) = drive(vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "\n"),
            Event::run_finished(FinishReason::Stop),
        ]);
        assert!(processor.messages().is_empty());
    }

    #[test]
    fn test_whitespace_kept_on_error() {
        let (processor, updates) = drive(vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "\n"),
            Event::run_error("upstream exploded"),
        ]);
        assert_eq!(processor.messages().len(), 1);
        assert!(updates.iter().any(|u| matches!(
            u,
            ProcessorUpdate::ErrorOccurred { message, .. } if message == "upstream exploded"
        )));
        assert_eq!(
            processor.result().error.as_deref(),
            Some("upstream exploded")
        );
    }

    #[test]
    fn test_lazy_assistant_creation() {
        let mut processor = StreamProcessor::new();
        processor.prepare_assistant_message();
        // Reserving an id creates no message.
        assert!(processor.messages().is_empty());

        processor.process_chunk(Event::text_message_content("", "hi"));
        assert_eq!(processor.messages().len(), 1);
    }

    #[test]
    fn test_id_rebinding_to_server_id() {
        let mut processor = StreamProcessor::new();
        let manual = processor.prepare_assistant_message();

        // A tool call arrives before any TEXT_MESSAGE_START, creating the
        // message under the reserved id.
        processor.process_chunk(Event::tool_call_start("t1", "get"));
        assert_eq!(processor.messages()[0].id, manual);

        // The server then names the canonical id; everything moves over.
        processor.process_chunk(Event::text_message_start("srv-1"));
        processor.process_chunk(Event::tool_call_args("t1", "{}"));
        processor.process_chunk(Event::text_message_content("srv-1", "done"));
        processor.process_chunk(Event::run_finished(FinishReason::Stop));

        let messages = processor.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "srv-1");
        assert!(messages[0].tool_call("t1").is_some());
        assert_eq!(messages[0].text_content(), "done");
    }

    #[test]
    fn test_orphan_args_and_duplicate_start_tolerated() {
        let (processor, _) = drive(vec![
            Event::tool_call_args("ghost", "{\"x\":1}"),
            Event::tool_call_start("t1", "get"),
            Event::tool_call_start("t1", "get"),
            Event::tool_call_end("ghost"),
            Event::run_finished(FinishReason::Stop),
        ]);

        let message = &processor.messages()[0];
        let calls = message.parts.iter().filter(|p| p.is_tool_call()).count();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_args_after_end_dropped() {
        let (processor, _) = drive(vec![
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"a\":1}"),
            Event::tool_call_end("t1"),
            Event::tool_call_args("t1", "garbage"),
            Event::run_finished(FinishReason::Stop),
        ]);
        let tc = processor.messages()[0].tool_call("t1").unwrap();
        assert_eq!(tc.arguments, "{\"a\":1}");
    }

    #[test]
    fn test_tool_call_state_monotonic_in_updates() {
        let (_, updates) = drive(vec![
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"a\":"),
            Event::tool_call_args("t1", "1}"),
            Event::tool_call_end("t1"),
            Event::run_finished(FinishReason::Stop),
        ]);

        let states: Vec<ToolCallState> = updates
            .iter()
            .filter_map(|u| match u {
                ProcessorUpdate::ToolCallStateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert!(!states.is_empty());
        for pair in states.windows(2) {
            assert!(
                pair[0].rank() <= pair[1].rank(),
                "state regressed: {pair:?}"
            );
        }
    }

    #[test]
    fn test_input_override_on_end() {
        let (processor, _) = drive(vec![
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"partial\":tru"),
            Event::ToolCallEnd {
                tool_call_id: "t1".into(),
                input: Some(json!({"complete": true})),
                result: None,
                meta: Default::default(),
            },
            Event::run_finished(FinishReason::Stop),
        ]);
        let tc = processor.messages()[0].tool_call("t1").unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&tc.arguments).unwrap(),
            json!({"complete": true})
        );
    }

    #[test]
    fn test_run_finished_force_completes_tool_calls() {
        let (processor, _) = drive(vec![
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"a\": 1"),
            Event::run_finished(FinishReason::ToolCalls),
        ]);
        let tc = processor.messages()[0].tool_call("t1").unwrap();
        assert_eq!(tc.state, ToolCallState::InputComplete);
    }

    #[test]
    fn test_content_fallback_reconciliation() {
        // Content frames that repeat or shrink are ignored; extensions
        // are adopted; non-prefix content appends as a safety net.
        let (processor, _) = drive(vec![
            Event::text_message_start("m1"),
            Event::text_message_snapshot("m1", "Hel"),
            Event::text_message_snapshot("m1", "Hel"),
            Event::text_message_snapshot("m1", "He"),
            Event::text_message_snapshot("m1", "Hello"),
            Event::run_finished(FinishReason::Stop),
        ]);
        assert_eq!(processor.messages()[0].text_content(), "Hello");
    }

    #[test]
    fn test_thinking_delta_and_blob_equivalent() {
        let (by_delta, _) = drive(vec![
            Event::step_finished(Some("m1".into()), "Let me "),
            Event::step_finished(Some("m1".into()), "think"),
            Event::text_message_content("m1", "answer"),
            Event::run_finished(FinishReason::Stop),
        ]);
        let (by_blob, _) = drive(vec![
            Event::StepFinished {
                message_id: Some("m1".into()),
                delta: None,
                content: Some("Let me think".into()),
                meta: Default::default(),
            },
            Event::text_message_content("m1", "answer"),
            Event::run_finished(FinishReason::Stop),
        ]);
        assert_eq!(by_delta.messages(), by_blob.messages());
        let parts = &by_delta.messages()[0].parts;
        assert_eq!(parts.iter().filter(|p| p.is_thinking()).count(), 1);
    }

    #[test]
    fn test_messages_snapshot_replaces_conversation() {
        let snapshot = vec![
            UiMessage::user("earlier"),
            UiMessage::assistant("m-old").with_part(MessagePart::ToolCall(
                ToolCallPart::new("t-old", "get").with_state(ToolCallState::InputComplete),
            )),
        ];
        let mut processor = StreamProcessor::new();
        processor.prepare_assistant_message();
        processor.process_chunk(Event::text_message_content("mx", "to be replaced"));
        processor.process_chunk(Event::messages_snapshot(snapshot.clone()));

        assert_eq!(processor.messages(), snapshot.as_slice());
        // Routing is rebuilt from the snapshot.
        processor.add_tool_result("t-old", json!({"ok": true}), ToolResultState::Complete, None);
        assert!(processor.messages()[1].tool_result("t-old").is_some());
    }

    #[test]
    fn test_custom_tool_input_available_dispatch() {
        let (_, updates) = drive(vec![
            Event::tool_call_start("t1", "write_file"),
            Event::tool_call_args("t1", "{\"path\":\"x\"}"),
            Event::tool_call_end("t1"),
            Event::custom(
                TOOL_INPUT_AVAILABLE,
                json!({
                    "toolCallId": "t1",
                    "toolName": "write_file",
                    "input": {"path": "x"},
                }),
            ),
        ]);
        let request = updates
            .iter()
            .find_map(|u| match u {
                ProcessorUpdate::ToolCallReady(req) => Some(req),
                _ => None,
            })
            .expect("tool call dispatched");
        assert_eq!(request.tool_name, "write_file");
        assert_eq!(request.input, json!({"path": "x"}));
    }

    #[test]
    fn test_approval_handshake() {
        // S5: approval-requested then a response advances the state.
        let (mut processor, updates) = drive(vec![
            Event::tool_call_start("t1", "send_email"),
            Event::tool_call_end("t1"),
            Event::custom(
                APPROVAL_REQUESTED,
                json!({
                    "toolCallId": "t1",
                    "toolName": "send_email",
                    "input": {"to": "x"},
                    "approval": {"id": "a1"},
                }),
            ),
            Event::run_finished(FinishReason::Stop),
        ]);

        let request = updates
            .iter()
            .find_map(|u| match u {
                ProcessorUpdate::ApprovalRequested(req) => Some(req.clone()),
                _ => None,
            })
            .expect("approval surfaced");
        assert_eq!(request.approval_id, "a1");

        let tc = processor.messages()[0].tool_call("t1").unwrap();
        assert_eq!(tc.state, ToolCallState::ApprovalRequested);
        assert!(!processor.are_all_tools_complete());

        let updates = processor.add_tool_approval_response("a1", true);
        assert!(!updates.is_empty());
        let tc = processor.messages()[0].tool_call("t1").unwrap();
        assert_eq!(tc.state, ToolCallState::ApprovalResponded);
        assert_eq!(tc.approval.as_ref().unwrap().approved, Some(true));
        assert!(processor.are_all_tools_complete());

        // Unknown approval id: no-op.
        assert!(processor.add_tool_approval_response("zzz", false).is_empty());
    }

    #[test]
    fn test_add_tool_result_records_output_and_result() {
        let (mut processor, _) = drive(vec![
            Event::tool_call_start("t1", "write_file"),
            Event::tool_call_end("t1"),
            Event::run_finished(FinishReason::Stop),
        ]);
        assert!(!processor.are_all_tools_complete());

        processor.add_tool_result("t1", json!({"ok": true}), ToolResultState::Complete, None);
        let message = &processor.messages()[0];
        assert_eq!(
            message.tool_call("t1").unwrap().output,
            Some(json!({"ok": true}))
        );
        assert_eq!(
            message.tool_result("t1").unwrap().state,
            ToolResultState::Complete
        );
        assert!(processor.are_all_tools_complete());
    }

    #[test]
    fn test_add_tool_result_error_state() {
        let (mut processor, _) = drive(vec![
            Event::tool_call_start("t1", "write_file"),
            Event::tool_call_end("t1"),
            Event::run_finished(FinishReason::Stop),
        ]);
        processor.add_tool_result(
            "t1",
            Value::String("disk full".into()),
            ToolResultState::Error,
            Some("disk full".into()),
        );
        let tr = processor.messages()[0].tool_result("t1").unwrap();
        assert_eq!(tr.state, ToolResultState::Error);
        assert_eq!(tr.error.as_deref(), Some("disk full"));
        // Errored executions still count as resolved so the model can react.
        assert!(processor.are_all_tools_complete());
    }

    #[test]
    fn test_to_model_messages_round_trip() {
        let mut processor = StreamProcessor::new();
        processor.add_user_message(UiMessage::user("hi"));
        processor.prepare_assistant_message();
        for event in [
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "calling"),
            Event::step_finished(Some("m1".into()), "secret reasoning"),
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"x\":1}"),
            Event::tool_call_result("t1", "42"),
            Event::run_finished(FinishReason::Stop),
        ] {
            processor.process_chunk(event);
        }

        let model = processor.to_model_messages();
        assert_eq!(model.len(), 3);
        assert_eq!(model[0].role, ModelRole::User);
        assert_eq!(model[0].content.as_text(), Some("hi"));

        assert_eq!(model[1].role, ModelRole::Assistant);
        assert_eq!(model[1].content.as_text(), Some("calling"));
        let calls = model[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].arguments, json!({"x": 1}));
        // Thinking never reaches the model.
        let serialized = serde_json::to_string(&model).unwrap();
        assert!(!serialized.contains("secret reasoning"));

        assert_eq!(model[2].role, ModelRole::Tool);
        assert_eq!(model[2].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(model[2].content.as_text(), Some("42"));
    }

    #[test]
    fn test_to_model_messages_multimodal_user() {
        let mut processor = StreamProcessor::new();
        processor.add_user_message(UiMessage::user_with_parts(vec![
            MessagePart::text("describe"),
            MessagePart::Content(ContentPart::url(ContentKind::Image, "https://x.test/a.png")),
        ]));
        let model = processor.to_model_messages();
        match &model[0].content {
            ModelContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0].kind, ContentKind::Text);
                assert_eq!(parts[1].kind, ContentKind::Image);
            }
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_messages_after() {
        let mut processor = StreamProcessor::new();
        let user = UiMessage::user("question");
        let user_id = user.id.clone();
        processor.add_user_message(user);
        processor.prepare_assistant_message();
        processor.process_chunk(Event::text_message_content("m1", "partial answer"));
        processor.process_chunk(Event::run_finished(FinishReason::Stop));
        assert_eq!(processor.messages().len(), 2);

        processor.remove_messages_after(&user_id);
        assert_eq!(processor.messages().len(), 1);
        assert_eq!(processor.messages()[0].id, user_id);

        // Unknown id: no-op.
        assert!(processor.remove_messages_after("missing").is_empty());
    }

    #[test]
    fn test_events_after_terminal_ignored() {
        let (mut processor, _) = drive(vec![
            Event::text_message_content("m1", "hello"),
            Event::run_finished(FinishReason::Stop),
        ]);
        let before = processor.get_messages();
        let updates = processor.process_chunk(Event::text_message_content("m1", " world"));
        assert!(updates.is_empty());
        assert_eq!(processor.messages(), before.as_slice());
    }

    #[test]
    fn test_part_ordering_grammar() {
        // Property 4: no two adjacent text parts; results follow calls.
        let (processor, _) = drive(vec![
            Event::text_message_content("m1", "a"),
            Event::tool_call_start("t1", "f"),
            Event::tool_call_result("t1", "1"),
            Event::text_message_content("m1", "b"),
            Event::tool_call_start("t2", "g"),
            Event::tool_call_end("t2"),
            Event::text_message_content("m1", "c"),
            Event::run_finished(FinishReason::Stop),
        ]);
        let parts = &processor.messages()[0].parts;
        for pair in parts.windows(2) {
            assert!(
                !(pair[0].is_text() && pair[1].is_text()),
                "adjacent text parts: {pair:?}"
            );
        }
        // Tool results immediately reference a call earlier in the message.
        let message = &processor.messages()[0];
        for part in parts {
            if let MessagePart::ToolResult(tr) = part {
                assert!(message.tool_call(&tr.tool_call_id).is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_process_stream_driver() {
        let events = vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "streamed"),
            Event::run_finished(FinishReason::Stop),
        ];
        let mut processor = StreamProcessor::new();
        processor.prepare_assistant_message();
        let result = processor.process(futures::stream::iter(events)).await;
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert_eq!(result.message_count, 1);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_usage_passthrough() {
        let (processor, _) = drive(vec![
            Event::text_message_content("m1", "hi"),
            Event::RunFinished {
                finish_reason: FinishReason::Stop,
                usage: Some(json!({"inputTokens": 3, "outputTokens": 7})),
                meta: Default::default(),
            },
        ]);
        assert_eq!(
            processor.result().usage,
            Some(json!({"inputTokens": 3, "outputTokens": 7}))
        );
    }
}
