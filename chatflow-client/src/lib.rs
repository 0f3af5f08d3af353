//! # chatflow-client
//!
//! The session-managing chat client: message submission, a persistent
//! subscription loop, cancellation, auto-continuation after tool
//! results, and client-executed tool dispatch.
//!
//! ## Example
//!
//! ```ignore
//! use chatflow_client::{ChatClient, FnTool};
//! use chatflow_transport::{QueueSession, SseConnection};
//! use std::sync::Arc;
//!
//! let session = Arc::new(QueueSession::new(Arc::new(
//!     SseConnection::new("http://localhost:3000/chat"),
//! )));
//! let client = ChatClient::builder(session)
//!     .tool("get_location", Arc::new(FnTool::new(|_| async move {
//!         Ok(serde_json::json!({"city": "Berlin"}))
//!     })))
//!     .build();
//!
//! client.send_message("Where am I?").await?;
//! for message in client.messages() {
//!     println!("{}: {}", message.id, message.text_content());
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod handler;
pub mod tools;

pub use client::{ChatClient, ChatClientBuilder};
pub use error::{ChatClientError, ChatClientResult};
pub use handler::{ChatHandler, ChatStatus, NoopHandler};
pub use tools::{ClientTool, FnTool};
