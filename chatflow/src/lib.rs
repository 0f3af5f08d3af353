//! # chatflow
//!
//! A transport-agnostic streaming chat protocol core: an AG-UI-style
//! event schema, a deterministic client-side state machine that folds
//! event streams into ordered conversations of UI messages, and a chat
//! client that manages the session around it.
//!
//! The workspace is organized as focused crates, re-exported here:
//!
//! - [`chatflow_core`]: event schema, message/part model, partial JSON
//! - [`chatflow_transport`]: SSE / NDJSON / in-process connections and
//!   the session queue
//! - [`chatflow_processor`]: pure mutators, emission strategies, the
//!   [`StreamProcessor`] and recording/replay
//! - [`chatflow_client`]: the [`ChatClient`] orchestrator
//!
//! ## Quick start
//!
//! ```ignore
//! use chatflow::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Arc::new(SseConnection::new("http://localhost:3000/chat"));
//!     let client = ChatClient::new(Arc::new(QueueSession::new(connection)));
//!
//!     client.send_message("What's the weather in Berlin?").await?;
//!     for message in client.messages() {
//!         println!("[{:?}] {}", message.role, message.text_content());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub use chatflow_client::{ChatClient, ChatClientBuilder, ChatHandler, ChatStatus, ClientTool, FnTool};
pub use chatflow_core::{Event, FinishReason, MessagePart, Role, UiMessage};
pub use chatflow_processor::{StreamProcessor, StreamRecording};
pub use chatflow_transport::{
    ConnectionAdapter, InProcessConnection, NdjsonConnection, QueueSession, SessionAdapter,
    SseConnection,
};

/// Prelude for common imports.
pub mod prelude {
    pub use chatflow_client::{
        ChatClient, ChatClientError, ChatHandler, ChatStatus, ClientTool, FnTool,
    };
    pub use chatflow_core::prelude::*;
    pub use chatflow_processor::{ProcessorUpdate, StreamProcessor};
    pub use chatflow_transport::{
        ConnectionAdapter, InProcessConnection, QueueSession, SessionAdapter, SseConnection,
    };
}
