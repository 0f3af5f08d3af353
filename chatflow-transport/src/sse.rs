//! Server-Sent Events transport.
//!
//! Wire format: `data: <compact JSON>\n\n` frames with a `data: [DONE]`
//! sentinel terminating the stream.

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

const MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// A parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type, if the server specified one.
    pub event: Option<String>,
    /// Frame data (joined `data:` lines).
    pub data: String,
}

impl SseFrame {
    /// Check if this is the `[DONE]` sentinel.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]" || self.event.as_deref() == Some("done")
    }
}

/// Incremental parser for SSE byte streams.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Create a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning any frames completed by it.
    pub fn feed(&mut self, bytes: &Bytes) -> TransportResult<Vec<SseFrame>> {
        let chunk = String::from_utf8_lossy(bytes);
        self.feed_str(&chunk)
    }

    /// Feed a string chunk, returning any frames completed by it.
    pub fn feed_str(&mut self, chunk: &str) -> TransportResult<Vec<SseFrame>> {
        self.buffer.push_str(chunk);
        if self.buffer.len() > MAX_BUFFER_SIZE {
            return Err(TransportError::BufferOverflow);
        }

        let mut frames = Vec::new();
        while let Some((pos, len)) = self.frame_boundary() {
            let raw = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + len);
            if let Some(frame) = parse_frame(&raw) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Flush a trailing frame when the stream ends without a final blank
    /// line.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let raw = std::mem::take(&mut self.buffer);
        parse_frame(raw.trim_end_matches(['\n', '\r'])).into_iter().collect()
    }

    fn frame_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.find("\n\n").map(|pos| (pos, 2));
        let crlf = self.buffer.find("\r\n\r\n").map(|pos| (pos, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

pin_project! {
    /// Stream adapter turning an SSE byte stream into protocol events.
    pub struct SseEventStream {
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        parser: SseParser,
        pending: VecDeque<Event>,
        finished: bool,
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
    }
}

impl SseEventStream {
    /// Wrap a byte stream.
    pub fn new(
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            finished: false,
            cancelled: cancel.cancelled_owned(),
        }
    }

    fn absorb(
        pending: &mut VecDeque<Event>,
        finished: &mut bool,
        frames: Vec<SseFrame>,
    ) {
        for frame in frames {
            if *finished {
                break;
            }
            if frame.is_done() {
                *finished = true;
            } else if let Some(event) = decode_frame(&frame.data) {
                pending.push_back(event);
            }
        }
    }
}

impl Stream for SseEventStream {
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
                Poll::Ready(Some(Ok(bytes))) => match this.parser.feed(&bytes) {
                    Ok(frames) => Self::absorb(this.pending, this.finished, frames),
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
                    let frames = this.parser.finish();
                    let mut done = false;
                    Self::absorb(this.pending, &mut done, frames);
                    *this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// SSE connection adapter: POSTs the conversation and reads an event
/// stream back.
pub struct SseConnection {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    extra_body: Option<Map<String, Value>>,
}

impl SseConnection {
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
impl ConnectionAdapter for SseConnection {
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
            .header("Accept", "text/event-stream")
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

        Ok(Box::pin(SseEventStream::new(
            response.bytes_stream().boxed(),
            cancel,
        )))
    }
}
