//! Connection abstraction.
//!
//! A [`ConnectionAdapter`] produces one event stream per request. The
//! stream must yield protocol events in adapter order, surface transport
//! faults as errors, and honor the cancellation token.

use crate::error::{TransportResult, TransportError};
use async_trait::async_trait;
use chatflow_core::events::legacy;
use chatflow_core::{Event, UiMessage};
use futures::Stream;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One request's worth of protocol events.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportResult<Event>> + Send>>;

/// Transport abstraction: request/response-per-call stream of events.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync {
    /// Open a new event stream for the given conversation.
    async fn connect(
        &self,
        messages: &[UiMessage],
        data: Option<Value>,
        cancel: CancellationToken,
    ) -> TransportResult<EventStream>;
}

/// Build the POST body for fetch-style adapters:
/// `{"messages": [...], "data": {...}, ...extra}`.
#[must_use]
pub fn build_request_body(
    messages: &[UiMessage],
    data: Option<&Value>,
    extra_body: Option<&Map<String, Value>>,
) -> Value {
    let mut body = Map::new();
    body.insert("messages".into(), json!(messages));
    if let Some(data) = data {
        body.insert("data".into(), data.clone());
    }
    if let Some(extra) = extra_body {
        for (key, value) in extra {
            body.insert(key.clone(), value.clone());
        }
    }
    Value::Object(body)
}

/// Decode one wire frame into a protocol event.
///
/// Canonical AG-UI frames decode directly; frames in the legacy lowercase
/// vocabulary are mapped onto the canonical union; anything else is
/// dropped with a debug log (unknown event types are ignored).
#[must_use]
pub(crate) fn decode_frame(data: &str) -> Option<Event> {
    if let Ok(event) = serde_json::from_str::<Event>(data) {
        return Some(event);
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => {
            let decoded = legacy::decode(&value);
            if decoded.is_none() {
                debug!(frame = %data, "dropping unrecognized event frame");
            }
            decoded
        }
        Err(error) => {
            debug!(%error, "dropping unparseable event frame");
            None
        }
    }
}

/// In-process connection fed from pre-scripted event batches.
///
/// Each `connect` call pops the next script; an exhausted connection
/// yields an empty stream (the session layer synthesizes the terminal
/// event). This is the deterministic test double for client scenarios.
pub struct InProcessConnection {
    scripts: Mutex<VecDeque<Vec<TransportResult<Event>>>>,
}

impl InProcessConnection {
    /// A connection that serves a single event script.
    #[must_use]
    pub fn new(events: Vec<Event>) -> Self {
        Self::with_scripts(vec![events])
    }

    /// A connection that serves one script per `connect` call, in order.
    #[must_use]
    pub fn with_scripts(scripts: Vec<Vec<Event>>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|s| s.into_iter().map(Ok).collect())
                    .collect(),
            ),
        }
    }

    /// A connection whose next `connect` call fails outright.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([vec![Err(TransportError::Connection(
                message.into(),
            ))]])),
        }
    }

    /// Queue another script for a later `connect` call.
    pub fn push_script(&self, events: Vec<Event>) {
        self.scripts
            .lock()
            .push_back(events.into_iter().map(Ok).collect());
    }

    /// Number of scripts not yet consumed.
    #[must_use]
    pub fn remaining_scripts(&self) -> usize {
        self.scripts.lock().len()
    }
}

#[async_trait]
impl ConnectionAdapter for InProcessConnection {
    async fn connect(
        &self,
        _messages: &[UiMessage],
        _data: Option<Value>,
        _cancel: CancellationToken,
    ) -> TransportResult<EventStream> {
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(script)))
    }
}
