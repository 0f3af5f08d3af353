//! The chat client.
//!
//! [`ChatClient`] wraps a [`StreamProcessor`] and a session: it submits
//! conversations, runs a background subscription loop that feeds the
//! processor, executes registered client tools, queues operations that
//! arrive mid-stream, and auto-continues after tool results so the
//! model can react.

use crate::error::{ChatClientError, ChatClientResult};
use crate::handler::{ChatHandler, ChatStatus, NoopHandler};
use crate::tools::ClientTool;
use chatflow_core::identifier::generate_conversation_id;
use chatflow_core::message::{MessagePart, Role, ToolCallState, ToolResultState, UiMessage};
use chatflow_core::model::ModelMessage;
use chatflow_processor::{ProcessorUpdate, StreamProcessor, ToolCallRequest};
use chatflow_transport::SessionAdapter;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_MAX_AUTO_CONTINUES: u32 = 8;

enum PendingAction {
    Append(UiMessage),
    ToolResult {
        tool_call_id: String,
        result: Result<Value, String>,
    },
    ApprovalResponse {
        approval_id: String,
        approved: bool,
    },
}

struct SubscriptionHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ClientState {
    status: ChatStatus,
    loading: bool,
    cancelled: bool,
    streaming_live: bool,
    send_cancel: Option<CancellationToken>,
    processing_done: Option<oneshot::Sender<()>>,
    pending_actions: VecDeque<PendingAction>,
    pending_tools: Vec<JoinHandle<()>>,
    next_data: Option<Value>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamOutcome {
    superseded: bool,
    cancelled: bool,
    errored: bool,
    appended_user: bool,
}

struct ClientInner {
    conversation_id: String,
    session: Arc<dyn SessionAdapter>,
    processor: Mutex<StreamProcessor>,
    handler: Arc<dyn ChatHandler>,
    tools: HashMap<String, Arc<dyn ClientTool>>,
    base_data: Option<Value>,
    auto_continue: bool,
    max_auto_continues: u32,
    generation: AtomicU64,
    state: Mutex<ClientState>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

/// Builder for [`ChatClient`].
pub struct ChatClientBuilder {
    session: Arc<dyn SessionAdapter>,
    handler: Arc<dyn ChatHandler>,
    tools: HashMap<String, Arc<dyn ClientTool>>,
    base_data: Option<Value>,
    auto_continue: bool,
    max_auto_continues: u32,
    conversation_id: Option<String>,
    processor: Option<StreamProcessor>,
}

impl ChatClientBuilder {
    /// Set the lifecycle handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn ChatHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Register a client-executed tool by name.
    #[must_use]
    pub fn tool(mut self, name: impl Into<String>, tool: Arc<dyn ClientTool>) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    /// Base `data` object merged into every request body.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.base_data = Some(data);
        self
    }

    /// Disable automatic continuation after tool results.
    #[must_use]
    pub fn without_auto_continue(mut self) -> Self {
        self.auto_continue = false;
        self
    }

    /// Cap consecutive auto-continuations (default 8).
    #[must_use]
    pub fn max_auto_continues(mut self, max: u32) -> Self {
        self.max_auto_continues = max;
        self
    }

    /// Use a fixed conversation id instead of a generated one.
    #[must_use]
    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Use a pre-configured processor (e.g. a custom emission strategy).
    #[must_use]
    pub fn processor(mut self, processor: StreamProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> ChatClient {
        ChatClient {
            inner: Arc::new(ClientInner {
                conversation_id: self
                    .conversation_id
                    .unwrap_or_else(generate_conversation_id),
                session: self.session,
                processor: Mutex::new(self.processor.unwrap_or_default()),
                handler: self.handler,
                tools: self.tools,
                base_data: self.base_data,
                auto_continue: self.auto_continue,
                max_auto_continues: self.max_auto_continues,
                generation: AtomicU64::new(0),
                state: Mutex::new(ClientState::default()),
                subscription: Mutex::new(None),
            }),
        }
    }
}

/// Session orchestrator over a [`StreamProcessor`].
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Create a client over a session with default options.
    #[must_use]
    pub fn new(session: Arc<dyn SessionAdapter>) -> Self {
        Self::builder(session).build()
    }

    /// Start building a client.
    #[must_use]
    pub fn builder(session: Arc<dyn SessionAdapter>) -> ChatClientBuilder {
        ChatClientBuilder {
            session,
            handler: Arc::new(NoopHandler),
            tools: HashMap::new(),
            base_data: None,
            auto_continue: true,
            max_auto_continues: DEFAULT_MAX_AUTO_CONTINUES,
            conversation_id: None,
            processor: None,
        }
    }

    /// The conversation id sent with every request.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    /// Current submission status.
    #[must_use]
    pub fn status(&self) -> ChatStatus {
        self.inner.state.lock().status
    }

    /// Whether a stream is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    /// Snapshot of the conversation.
    #[must_use]
    pub fn messages(&self) -> Vec<UiMessage> {
        self.inner.processor.lock().get_messages()
    }

    /// Project the conversation into the model round-trip shape.
    #[must_use]
    pub fn to_model_messages(&self) -> Vec<ModelMessage> {
        self.inner.processor.lock().to_model_messages()
    }

    /// Replace the conversation.
    pub fn set_messages(&self, messages: Vec<UiMessage>) {
        let updates = self.inner.processor.lock().set_messages(messages);
        self.dispatch_updates(updates);
    }

    /// Clear the conversation.
    pub fn clear_messages(&self) {
        let updates = self.inner.processor.lock().clear_messages();
        self.dispatch_updates(updates);
    }

    /// Send a plain-text user message and stream the response.
    pub async fn send_message(&self, text: impl Into<String>) -> ChatClientResult<()> {
        self.append(UiMessage::user(text)).await
    }

    /// Send a plain-text user message with per-call body data.
    pub async fn send_message_with_data(
        &self,
        text: impl Into<String>,
        data: Value,
    ) -> ChatClientResult<()> {
        self.inner.state.lock().next_data = Some(data);
        self.append(UiMessage::user(text)).await
    }

    /// Append a user message and stream the response. Mid-stream, the
    /// message is queued and submitted after the current stream drains.
    pub async fn append(&self, message: UiMessage) -> ChatClientResult<()> {
        let queued = {
            let mut state = self.inner.state.lock();
            if state.streaming_live {
                state.pending_actions.push_back(PendingAction::Append(message.clone()));
                true
            } else {
                false
            }
        };
        if queued {
            return Ok(());
        }
        let updates = self.inner.processor.lock().add_user_message(message);
        self.dispatch_updates(updates);
        self.run_stream_loop().await
    }

    /// Re-submit the conversation and stream a response without adding a
    /// message.
    pub async fn stream_response(&self) -> ChatClientResult<()> {
        self.run_stream_loop().await
    }

    /// Record the result of a tool the host executed out of band.
    pub async fn add_tool_result(
        &self,
        tool_call_id: impl Into<String>,
        output: Value,
    ) -> ChatClientResult<()> {
        self.submit_action(PendingAction::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: Ok(output),
        })
        .await
    }

    /// Record a failed tool execution; auto-continue still runs so the
    /// model can react to the failure.
    pub async fn add_tool_failure(
        &self,
        tool_call_id: impl Into<String>,
        error: impl Into<String>,
    ) -> ChatClientResult<()> {
        self.submit_action(PendingAction::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: Err(error.into()),
        })
        .await
    }

    /// Answer an approval handshake.
    pub async fn add_tool_approval_response(
        &self,
        approval_id: impl Into<String>,
        approved: bool,
    ) -> ChatClientResult<()> {
        self.submit_action(PendingAction::ApprovalResponse {
            approval_id: approval_id.into(),
            approved,
        })
        .await
    }

    /// Abort the in-flight stream and return to ready. Cancellation is
    /// silent: no error is reported.
    pub fn stop(&self) {
        let inner = &self.inner;
        let (send_cancel, done) = {
            let mut state = inner.state.lock();
            state.cancelled = true;
            state.loading = false;
            (state.send_cancel.take(), state.processing_done.take())
        };
        if let Some(cancel) = send_cancel {
            cancel.cancel();
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
        if let Some(subscription) = inner.subscription.lock().take() {
            subscription.cancel.cancel();
            subscription.handle.abort();
        }
        inner.set_status(ChatStatus::Ready);
    }

    /// Abort any current stream, drop everything after the last user
    /// message and stream a fresh response.
    pub async fn reload(&self) -> ChatClientResult<()> {
        let inner = &self.inner;
        // Supersede the in-flight stream: it will observe the generation
        // change and skip its cleanup, leaving these fields to us.
        inner.generation.fetch_add(1, Ordering::SeqCst);
        let (send_cancel, done) = {
            let mut state = inner.state.lock();
            state.loading = false;
            state.streaming_live = false;
            (state.send_cancel.take(), state.processing_done.take())
        };
        if let Some(cancel) = send_cancel {
            cancel.cancel();
        }
        if let Some(done) = done {
            let _ = done.send(());
        }

        let last_user_id = {
            let processor = inner.processor.lock();
            processor
                .messages()
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.id.clone())
        };
        if let Some(id) = last_user_id {
            let updates = inner.processor.lock().remove_messages_after(&id);
            self.dispatch_updates(updates);
        }
        self.run_stream_loop().await
    }
}

impl ChatClient {
    async fn run_stream_loop(&self) -> ChatClientResult<()> {
        let mut continuations = 0u32;
        loop {
            let outcome = self.stream_once().await?;
            if outcome.superseded || outcome.cancelled || outcome.errored {
                return Ok(());
            }
            let continue_now = outcome.appended_user
                || (self.inner.should_auto_continue()
                    && continuations < self.inner.max_auto_continues);
            if !continue_now {
                return Ok(());
            }
            continuations += 1;
        }
    }

    async fn stream_once(&self) -> ChatClientResult<StreamOutcome> {
        let inner = &self.inner;
        if inner.state.lock().streaming_live {
            return Err(ChatClientError::Busy);
        }
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.ensure_subscription();

        let send_cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        {
            let mut state = inner.state.lock();
            state.streaming_live = true;
            state.loading = true;
            state.cancelled = false;
            state.send_cancel = Some(send_cancel.clone());
            state.processing_done = Some(done_tx);
        }
        inner.set_status(ChatStatus::Submitted);

        let data = inner.merged_data();
        let messages = {
            let mut processor = inner.processor.lock();
            processor.prepare_assistant_message();
            processor.get_messages()
        };

        let send_result = inner.session.send(&messages, Some(data), send_cancel).await;
        // The terminal event (possibly synthesized by the session on
        // failure) resolves this; `stop` resolves it on cancellation.
        let _ = done_rx.await;

        let pending: Vec<JoinHandle<()>> = {
            let mut state = inner.state.lock();
            state.pending_tools.drain(..).collect()
        };
        for handle in pending {
            let _ = handle.await;
        }

        if inner.generation.load(Ordering::SeqCst) != generation {
            // Superseded: the newer stream owns loading and abort state.
            return Ok(StreamOutcome {
                superseded: true,
                ..StreamOutcome::default()
            });
        }

        let cancelled = inner.state.lock().cancelled;
        let updates = inner.processor.lock().finalize_stream();
        if !cancelled {
            self.dispatch_updates(updates);
        }

        let mut appended_user = false;
        loop {
            let action = inner.state.lock().pending_actions.pop_front();
            let Some(action) = action else { break };
            if matches!(action, PendingAction::Append(_)) {
                appended_user = true;
            }
            let updates = inner.apply_action(action);
            if !cancelled {
                self.dispatch_updates(updates);
            }
        }

        let errored = !cancelled && inner.processor.lock().result().error.is_some();
        {
            let mut state = inner.state.lock();
            state.loading = false;
            state.streaming_live = false;
            state.send_cancel = None;
            state.processing_done = None;
        }
        inner.set_status(if errored {
            ChatStatus::Error
        } else {
            ChatStatus::Ready
        });

        let outcome = StreamOutcome {
            superseded: false,
            cancelled,
            errored,
            appended_user,
        };
        match send_result {
            Ok(()) => Ok(outcome),
            Err(_) if cancelled => Ok(outcome),
            Err(error) => Err(error.into()),
        }
    }

    fn ensure_subscription(&self) {
        let mut guard = self.inner.subscription.lock();
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let mut stream = self.inner.session.subscribe(cancel.clone());
        let client = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        let updates = client.inner.processor.lock().process_chunk(event);
                        client.dispatch_updates(updates);
                        if terminal {
                            if let Some(done) = client.inner.state.lock().processing_done.take() {
                                let _ = done.send(());
                            }
                        }
                        // Keep the UI responsive between chunks.
                        tokio::task::yield_now().await;
                    }
                    Err(error) => {
                        // Transport faults reach the processor as
                        // synthesized RUN_ERROR events; this path only
                        // carries queue-level noise.
                        debug!(%error, "subscription item error");
                    }
                }
            }
        });
        *guard = Some(SubscriptionHandle { handle, cancel });
    }

    fn dispatch_updates(&self, updates: Vec<ProcessorUpdate>) {
        let inner = &self.inner;
        for update in updates {
            match update {
                ProcessorUpdate::MessagesChanged => {
                    let snapshot = inner.processor.lock().get_messages();
                    inner.handler.on_messages_change(&snapshot);
                }
                ProcessorUpdate::StreamStarted => {
                    inner.set_status(ChatStatus::Streaming);
                    inner.handler.on_stream_start();
                }
                ProcessorUpdate::StreamEnded { message } => {
                    inner.handler.on_stream_end(message.as_ref());
                }
                ProcessorUpdate::ErrorOccurred { message, .. } => {
                    if !inner.state.lock().cancelled {
                        inner.handler.on_error(&message);
                    }
                }
                ProcessorUpdate::TextUpdated {
                    message_id,
                    content,
                } => {
                    inner.handler.on_text_update(&message_id, &content);
                }
                ProcessorUpdate::ThinkingUpdated {
                    message_id,
                    content,
                } => {
                    inner.handler.on_thinking_update(&message_id, &content);
                }
                ProcessorUpdate::ToolCallStateChanged {
                    message_id,
                    tool_call_id,
                    state,
                    arguments,
                } => {
                    inner.handler.on_tool_call_state_change(
                        &message_id,
                        &tool_call_id,
                        state,
                        &arguments,
                    );
                }
                ProcessorUpdate::ToolCallReady(request) => {
                    self.spawn_tool_execution(request);
                }
                ProcessorUpdate::ApprovalRequested(request) => {
                    inner.handler.on_approval_request(&request);
                }
            }
        }
    }

    fn spawn_tool_execution(&self, request: ToolCallRequest) {
        self.inner.handler.on_tool_call(&request);
        let Some(tool) = self.inner.tools.get(&request.tool_name).cloned() else {
            debug!(tool = %request.tool_name, "no client tool registered");
            return;
        };
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let result = tool.execute(request.input).await;
            // Tool executions finish while the stream is live; their
            // results drain after finalization.
            client
                .inner
                .state
                .lock()
                .pending_actions
                .push_back(PendingAction::ToolResult {
                    tool_call_id: request.tool_call_id,
                    result,
                });
        });
        self.inner.state.lock().pending_tools.push(handle);
    }

    async fn submit_action(&self, action: PendingAction) -> ChatClientResult<()> {
        let action = {
            let mut state = self.inner.state.lock();
            if state.streaming_live {
                state.pending_actions.push_back(action);
                None
            } else {
                Some(action)
            }
        };
        let Some(action) = action else {
            return Ok(());
        };
        let updates = self.inner.apply_action(action);
        self.dispatch_updates(updates);
        if self.inner.should_auto_continue() {
            self.run_stream_loop().await?;
        }
        Ok(())
    }
}

impl ClientInner {
    fn apply_action(&self, action: PendingAction) -> Vec<ProcessorUpdate> {
        let mut processor = self.processor.lock();
        match action {
            PendingAction::Append(message) => processor.add_user_message(message),
            PendingAction::ToolResult {
                tool_call_id,
                result,
            } => match result {
                Ok(output) => processor.add_tool_result(
                    &tool_call_id,
                    output,
                    ToolResultState::Complete,
                    None,
                ),
                Err(error) => processor.add_tool_result(
                    &tool_call_id,
                    Value::String(error.clone()),
                    ToolResultState::Error,
                    Some(error),
                ),
            },
            PendingAction::ApprovalResponse {
                approval_id,
                approved,
            } => processor.add_tool_approval_response(&approval_id, approved),
        }
    }

    fn should_auto_continue(&self) -> bool {
        if !self.auto_continue {
            return false;
        }
        let processor = self.processor.lock();
        if !processor.are_all_tools_complete() {
            return false;
        }
        let Some(last) = processor.messages().last() else {
            return false;
        };
        if last.role != Role::Assistant {
            return false;
        }
        match last.last_part() {
            Some(MessagePart::ToolResult(_)) => true,
            Some(MessagePart::ToolCall(tc)) => tc.state == ToolCallState::ApprovalResponded,
            _ => false,
        }
    }

    fn merged_data(&self) -> Value {
        let mut merged = Map::new();
        if let Some(Value::Object(base)) = &self.base_data {
            for (key, value) in base {
                merged.insert(key.clone(), value.clone());
            }
        }
        if let Some(Value::Object(next)) = self.state.lock().next_data.take() {
            for (key, value) in next {
                merged.insert(key, value);
            }
        }
        merged.insert("conversationId".into(), json!(self.conversation_id));
        Value::Object(merged)
    }

    fn set_status(&self, status: ChatStatus) {
        let changed = {
            let mut state = self.state.lock();
            if state.status == status {
                false
            } else {
                state.status = status;
                true
            }
        };
        if changed {
            self.handler.on_status_change(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use chatflow_core::events::{Event, FinishReason, APPROVAL_REQUESTED, TOOL_INPUT_AVAILABLE};
    use chatflow_processor::ApprovalRequest;
    use chatflow_transport::{InProcessConnection, QueueSession};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHandler {
        statuses: Mutex<Vec<ChatStatus>>,
        errors: Mutex<Vec<String>>,
        approvals: Mutex<Vec<ApprovalRequest>>,
        tool_calls: Mutex<Vec<ToolCallRequest>>,
        text_updates: Mutex<Vec<(String, String)>>,
        messages_changes: Mutex<usize>,
    }

    impl ChatHandler for RecordingHandler {
        fn on_status_change(&self, status: ChatStatus) {
            self.statuses.lock().push(status);
        }
        fn on_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
        fn on_approval_request(&self, request: &ApprovalRequest) {
            self.approvals.lock().push(request.clone());
        }
        fn on_tool_call(&self, request: &ToolCallRequest) {
            self.tool_calls.lock().push(request.clone());
        }
        fn on_text_update(&self, message_id: &str, content: &str) {
            self.text_updates
                .lock()
                .push((message_id.to_string(), content.to_string()));
        }
        fn on_messages_change(&self, _messages: &[UiMessage]) {
            *self.messages_changes.lock() += 1;
        }
    }

    fn client_for(
        scripts: Vec<Vec<Event>>,
    ) -> (ChatClient, Arc<RecordingHandler>, Arc<InProcessConnection>) {
        let connection = Arc::new(InProcessConnection::with_scripts(scripts));
        let session = Arc::new(QueueSession::new(connection.clone()));
        let handler = Arc::new(RecordingHandler::default());
        let client = ChatClient::builder(session)
            .handler(handler.clone())
            .conversation_id("conv-test")
            .build();
        (client, handler, connection)
    }

    #[tokio::test]
    async fn test_send_message_streams_answer() {
        let (client, handler, _) = client_for(vec![vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "Hel"),
            Event::text_message_content("m1", "lo"),
            Event::run_finished(FinishReason::Stop),
        ]]);

        client.send_message("hi").await.unwrap();

        let messages = client.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text_content(), "hi");
        assert_eq!(messages[1].id, "m1");
        assert_eq!(messages[1].text_content(), "Hello");

        assert!(!client.is_loading());
        assert_eq!(client.status(), ChatStatus::Ready);
        assert_eq!(
            handler.statuses.lock().as_slice(),
            &[ChatStatus::Submitted, ChatStatus::Streaming, ChatStatus::Ready]
        );
        let texts = handler.text_updates.lock();
        assert_eq!(
            texts.as_slice(),
            &[
                ("m1".to_string(), "Hel".to_string()),
                ("m1".to_string(), "Hello".to_string()),
            ]
        );
        assert!(*handler.messages_changes.lock() > 0);
    }

    #[tokio::test]
    async fn test_run_error_sets_error_status() {
        let (client, handler, _) = client_for(vec![vec![
            Event::text_message_content("m1", "partial"),
            Event::run_error("model exploded"),
        ]]);

        client.send_message("hi").await.unwrap();

        assert_eq!(client.status(), ChatStatus::Error);
        assert_eq!(handler.errors.lock().as_slice(), &["model exploded".to_string()]);
        // The partial content is kept for inspection.
        assert_eq!(client.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_client_tool_dispatch_and_auto_continue() {
        // A client tool executes locally, its result is recorded, and a
        // second stream runs automatically so the model can react.
        let connection = Arc::new(InProcessConnection::with_scripts(vec![
            vec![
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
                Event::run_finished(FinishReason::ToolCalls),
            ],
            vec![
                Event::text_message_start("m2"),
                Event::text_message_content("m2", "File written."),
                Event::run_finished(FinishReason::Stop),
            ],
        ]));
        let session = Arc::new(QueueSession::new(connection.clone()));
        let handler = Arc::new(RecordingHandler::default());
        let client = ChatClient::builder(session)
            .handler(handler.clone())
            .tool(
                "write_file",
                Arc::new(FnTool::new(|_input| async move { Ok(json!({"ok": true})) })),
            )
            .build();

        client.send_message("write it").await.unwrap();

        let messages = client.messages();
        assert_eq!(messages.len(), 3, "user, tool turn, follow-up answer");
        let tool_turn = &messages[1];
        let tc = tool_turn.tool_call("t1").unwrap();
        assert_eq!(tc.state, ToolCallState::InputComplete);
        assert_eq!(tc.output, Some(json!({"ok": true})));
        let tr = tool_turn.tool_result("t1").unwrap();
        assert_eq!(tr.state, ToolResultState::Complete);
        assert_eq!(messages[2].text_content(), "File written.");

        assert_eq!(handler.tool_calls.lock().len(), 1);
        assert_eq!(connection.remaining_scripts(), 0, "auto-continue consumed both");
        assert_eq!(client.status(), ChatStatus::Ready);
    }

    #[tokio::test]
    async fn test_tool_failure_still_continues() {
        let connection = Arc::new(InProcessConnection::with_scripts(vec![
            vec![
                Event::tool_call_start("t1", "flaky"),
                Event::tool_call_end("t1"),
                Event::custom(
                    TOOL_INPUT_AVAILABLE,
                    json!({"toolCallId": "t1", "toolName": "flaky", "input": {}}),
                ),
                Event::run_finished(FinishReason::ToolCalls),
            ],
            vec![
                Event::text_message_content("m2", "Understood, it failed."),
                Event::run_finished(FinishReason::Stop),
            ],
        ]));
        let session = Arc::new(QueueSession::new(connection.clone()));
        let client = ChatClient::builder(session)
            .tool(
                "flaky",
                Arc::new(FnTool::new(|_| async move { Err("disk full".to_string()) })),
            )
            .build();

        client.send_message("try it").await.unwrap();

        let messages = client.messages();
        let tr = messages[1].tool_result("t1").unwrap();
        assert_eq!(tr.state, ToolResultState::Error);
        assert_eq!(tr.error.as_deref(), Some("disk full"));
        assert_eq!(connection.remaining_scripts(), 0);
    }

    #[tokio::test]
    async fn test_approval_flow_continues_after_response() {
        let (client, handler, connection) = client_for(vec![
            vec![
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
            ],
            vec![
                Event::text_message_content("m2", "Email sent."),
                Event::run_finished(FinishReason::Stop),
            ],
        ]);

        client.send_message("email x").await.unwrap();

        // The first stream parked the call at approval-requested.
        let approvals = handler.approvals.lock().clone();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].approval_id, "a1");
        let tc = client.messages()[1].tool_call("t1").unwrap().clone();
        assert_eq!(tc.state, ToolCallState::ApprovalRequested);
        assert_eq!(connection.remaining_scripts(), 1, "no continuation yet");

        client.add_tool_approval_response("a1", true).await.unwrap();

        let messages = client.messages();
        let tc = messages[1].tool_call("t1").unwrap();
        assert_eq!(tc.state, ToolCallState::ApprovalResponded);
        assert_eq!(tc.approval.as_ref().unwrap().approved, Some(true));
        assert_eq!(messages.last().unwrap().text_content(), "Email sent.");
        assert_eq!(connection.remaining_scripts(), 0);
    }

    #[tokio::test]
    async fn test_reload_replaces_assistant_answer() {
        let (client, _, _) = client_for(vec![
            vec![
                Event::text_message_start("m1"),
                Event::text_message_content("m1", "first answer"),
                Event::run_finished(FinishReason::Stop),
            ],
            vec![
                Event::text_message_start("m2"),
                Event::text_message_content("m2", "second answer"),
                Event::run_finished(FinishReason::Stop),
            ],
        ]);

        client.send_message("question").await.unwrap();
        assert_eq!(client.messages()[1].text_content(), "first answer");

        client.reload().await.unwrap();

        let messages = client.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].text_content(), "second answer");
    }

    #[tokio::test]
    async fn test_stop_is_silent() {
        let (client, handler, _) = client_for(vec![vec![
            Event::text_message_content("m1", "hello"),
            Event::run_finished(FinishReason::Stop),
        ]]);

        client.send_message("hi").await.unwrap();
        client.stop();

        assert_eq!(client.status(), ChatStatus::Ready);
        assert!(!client.is_loading());
        assert!(handler.errors.lock().is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_only_answer_pruned() {
        let (client, _, _) = client_for(vec![vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "\n"),
            Event::run_finished(FinishReason::Stop),
        ]]);

        client.send_message("hi").await.unwrap();
        let messages = client.messages();
        assert_eq!(messages.len(), 1, "only the user message survives");
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_conversation_id_in_request_body() {
        // merged_data carries base data, per-call data, and the id.
        let (client, _, _) = client_for(vec![vec![Event::run_finished(FinishReason::Stop)]]);
        let merged = client.inner.merged_data();
        assert_eq!(merged["conversationId"], "conv-test");

        let session = client.inner.session.clone();
        let with_base = ChatClient::builder(session)
            .data(json!({"model": "small"}))
            .conversation_id("conv-2")
            .build();
        with_base.inner.state.lock().next_data = Some(json!({"temperature": 0.1}));
        let merged = with_base.inner.merged_data();
        assert_eq!(merged["model"], "small");
        assert_eq!(merged["temperature"], 0.1);
        assert_eq!(merged["conversationId"], "conv-2");
    }

    #[tokio::test]
    async fn test_no_auto_continue_when_disabled() {
        let connection = Arc::new(InProcessConnection::with_scripts(vec![
            vec![
                Event::tool_call_start("t1", "noop"),
                Event::tool_call_result("t1", "done"),
                Event::run_finished(FinishReason::Stop),
            ],
            vec![
                Event::text_message_content("m2", "should not stream"),
                Event::run_finished(FinishReason::Stop),
            ],
        ]));
        let session = Arc::new(QueueSession::new(connection.clone()));
        let client = ChatClient::builder(session).without_auto_continue().build();

        client.send_message("go").await.unwrap();
        assert_eq!(connection.remaining_scripts(), 1, "second script untouched");
    }
}
