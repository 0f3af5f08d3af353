//! Newline-delimited JSON transport.
//!
//! Wire format: one compact JSON object per line.

use crate::connection::{build_request_body, decode_frame, ConnectionAdapter, EventStream};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use bytes::Bytes;
use chatflow_core::{Event, UiMessage};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

const MAX_LINE_SIZE: usize = 10 * 1024 * 1024;

/// Incremental line splitter for NDJSON streams.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    /// Create a new line buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning completed lines.
    pub fn feed(&mut self, bytes: &Bytes) -> TransportResult<Vec<String>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        if self.buffer.len() > MAX_LINE_SIZE {
            return Err(TransportError::BufferOverflow);
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        Ok(lines)
    }

    /// Flush a trailing line when the stream ends without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim();
        (!tail.is_empty()).then(|| tail.to_string())
    }
}

pin_project! {
    /// Stream adapter turning NDJSON bytes into protocol events.
    pub struct NdjsonEventStream {
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        lines: LineBuffer,
        pending: VecDeque<Event>,
        finished: bool,
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
    }
}

impl NdjsonEventStream {
    /// Wrap a byte stream.
    pub fn new(
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            finished: false,
            cancelled: cancel.cancelled_owned(),
        }
    }
}

impl Stream for NdjsonEventStream {
    type Item = TransportResult<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if *this.finished {
                return Poll::Ready(None);
            }
            if this.cancelled.as_mut().poll(cx).is_ready() {
                *this.finished = true;
                return Poll::Ready(Some(Err(TransportError::Aborted)));
            }

            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(bytes))) => match this.lines.feed(&bytes) {
                    Ok(lines) => {
                        this.pending
                            .extend(lines.iter().filter_map(|l| decode_frame(l)));
                    }
                    Err(error) => {
                        *this.finished = true;
                        return Poll::Ready(Some(Err(error)));
                    }
                },
                Poll::Ready(Some(Err(error))) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(error.into())));
                }
                Poll::Ready(None) => {
                    if let Some(tail) = this.lines.finish() {
                        this.pending.extend(decode_frame(&tail));
                    }
                    *this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// NDJSON connection adapter.
pub struct NdjsonConnection {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    extra_body: Option<Map<String, Value>>,
}

impl NdjsonConnection {
    /// Create a connection to the given endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers: Vec::new(),
            extra_body: None,
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Merge extra fields into the top level of every request body.
    #[must_use]
    pub fn with_extra_body(mut self, extra: Map<String, Value>) -> Self {
        self.extra_body = Some(extra);
        self
    }
}

#[async_trait]
impl ConnectionAdapter for NdjsonConnection {
    async fn connect(
        &self,
        messages: &[UiMessage],
        data: Option<Value>,
        cancel: CancellationToken,
    ) -> TransportResult<EventStream> {
        let body = build_request_body(messages, data.as_ref(), self.extra_body.as_ref());

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Aborted),
            response = request.send() => response?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(Box::pin(NdjsonEventStream::new(
            response.bytes_stream().boxed(),
            cancel,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_splits() {
        let mut lines = LineBuffer::new();
        let out = lines.feed(&Bytes::from("{\"a\":1}\n{\"b\":")).unwrap();
        assert_eq!(out, vec!["{\"a\":1}"]);
        let out = lines.feed(&Bytes::from("2}\n")).unwrap();
        assert_eq!(out, vec!["{\"b\":2}"]);
        assert!(lines.finish().is_none());
    }

    #[test]
    fn test_line_buffer_tail() {
        let mut lines = LineBuffer::new();
        lines.feed(&Bytes::from("{\"a\":1}")).unwrap();
        assert_eq!(lines.finish().as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_ndjson_stream_decodes_both_vocabularies() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from(concat!(
            "{\"type\":\"TEXT_MESSAGE_START\",\"messageId\":\"m1\",\"role\":\"assistant\"}\n",
            "{\"type\":\"text\",\"messageId\":\"m1\",\"content\":\"hi\"}\n",
            "{\"type\":\"done\"}\n",
        )))];
        let stream = NdjsonEventStream::new(
            futures::stream::iter(chunks).boxed(),
            CancellationToken::new(),
        );
        let events: Vec<Event> = stream.map(Result::unwrap).collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::TextMessageStart { .. }));
        assert!(matches!(events[1], Event::TextMessageContent { .. }));
        assert!(events[2].is_terminal());
    }
}
