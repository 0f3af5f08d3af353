//! # chatflow-transport
//!
//! Transport adapters for the chatflow protocol: the per-request
//! [`ConnectionAdapter`] abstraction with SSE, NDJSON and in-process
//! implementations, and the long-lived [`SessionAdapter`] with its
//! default single-subscriber queue.
//!
//! ## Example
//!
//! ```ignore
//! use chatflow_transport::{QueueSession, SseConnection, SessionAdapter};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let session = QueueSession::new(Arc::new(SseConnection::new("http://localhost:3000/chat")));
//! let mut events = session.subscribe(CancellationToken::new());
//! session.send(&messages, None, CancellationToken::new()).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod ndjson;
pub mod session;
pub mod sse;

pub use connection::{build_request_body, ConnectionAdapter, EventStream, InProcessConnection};
pub use error::{TransportError, TransportResult};
pub use ndjson::NdjsonConnection;
pub use session::{QueueSession, SessionAdapter};
pub use sse::{SseConnection, SseEventStream, SseFrame, SseParser};
