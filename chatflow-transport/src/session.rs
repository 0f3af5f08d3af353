//! Session abstraction.
//!
//! A session is a long-lived subscribe/send channel. [`QueueSession`]
//! wraps a [`ConnectionAdapter`] with a single-subscriber queue:
//! `send` drives one connection and pushes its events; `subscribe`
//! synchronously replaces the current subscriber, which adopts any
//! buffered events. Replacement is what makes reload-while-streaming
//! safe: a superseded subscriber detaches without destroying chunks
//! meant for its successor.

use crate::connection::{ConnectionAdapter, EventStream};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use chatflow_core::{Event, FinishReason, UiMessage};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Long-lived subscribe/send channel between client and server.
#[async_trait]
pub trait SessionAdapter: Send + Sync {
    /// Subscribe to the session's event feed.
    ///
    /// Subscribing replaces any previous subscriber synchronously; the
    /// new subscriber adopts events that were buffered while nobody was
    /// listening.
    fn subscribe(&self, cancel: CancellationToken) -> EventStream;

    /// Submit the conversation and pump the resulting events into the
    /// subscriber queue.
    ///
    /// A connection fault pushes a synthesized `RUN_ERROR` *and*
    /// re-raises, so both the subscribe path and the send path observe
    /// the failure. A stream that ends without a terminal event gets a
    /// synthesized `RUN_FINISHED{stop}`.
    async fn send(
        &self,
        messages: &[UiMessage],
        data: Option<Value>,
        cancel: CancellationToken,
    ) -> TransportResult<()>;
}

#[derive(Default)]
struct SubscriberSlot {
    epoch: u64,
    buffer: VecDeque<Event>,
    waker: Option<Waker>,
}

impl SubscriberSlot {
    fn push(&mut self, event: Event) {
        self.buffer.push_back(event);
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Default [`SessionAdapter`]: one connection per `send`, events fanned
/// through an epoch-guarded single-subscriber queue.
pub struct QueueSession {
    connection: Arc<dyn ConnectionAdapter>,
    slot: Arc<Mutex<SubscriberSlot>>,
}

impl QueueSession {
    /// Wrap a connection adapter.
    #[must_use]
    pub fn new(connection: Arc<dyn ConnectionAdapter>) -> Self {
        Self {
            connection,
            slot: Arc::new(Mutex::new(SubscriberSlot::default())),
        }
    }

    fn push(&self, event: Event) {
        self.slot.lock().push(event);
    }
}

#[async_trait]
impl SessionAdapter for QueueSession {
    fn subscribe(&self, cancel: CancellationToken) -> EventStream {
        let epoch = {
            let mut slot = self.slot.lock();
            slot.epoch += 1;
            // Wake a superseded subscriber so it observes the epoch
            // change and detaches.
            if let Some(waker) = slot.waker.take() {
                waker.wake();
            }
            slot.epoch
        };
        Box::pin(SubscriptionStream {
            slot: Arc::clone(&self.slot),
            epoch,
            done: false,
            cancelled: cancel.cancelled_owned(),
        })
    }

    async fn send(
        &self,
        messages: &[UiMessage],
        data: Option<Value>,
        cancel: CancellationToken,
    ) -> TransportResult<()> {
        let mut stream = match self
            .connection
            .connect(messages, data, cancel.clone())
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                self.push(Event::run_error(error.to_string()));
                return Err(error);
            }
        };

        let mut saw_terminal = false;
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.push(Event::run_error("request aborted"));
                    return Err(TransportError::Aborted);
                }
                item = stream.next() => item,
            };
            match item {
                Some(Ok(event)) => {
                    if event.is_terminal() {
                        saw_terminal = true;
                    }
                    self.push(event);
                }
                Some(Err(error)) => {
                    self.push(Event::run_error(error.to_string()));
                    return Err(error);
                }
                None => break,
            }
        }

        if !saw_terminal {
            self.push(Event::run_finished(FinishReason::Stop));
        }
        Ok(())
    }
}

pin_project! {
    struct SubscriptionStream {
        slot: Arc<Mutex<SubscriberSlot>>,
        epoch: u64,
        done: bool,
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
    }
}

impl Stream for SubscriptionStream {
    type Item = TransportResult<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.done {
            return Poll::Ready(None);
        }
        if this.cancelled.as_mut().poll(cx).is_ready() {
            *this.done = true;
            return Poll::Ready(None);
        }

        let mut slot = this.slot.lock();
        if slot.epoch != *this.epoch {
            // Superseded by a newer subscriber.
            *this.done = true;
            return Poll::Ready(None);
        }
        if let Some(event) = slot.buffer.pop_front() {
            return Poll::Ready(Some(Ok(event)));
        }
        slot.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
