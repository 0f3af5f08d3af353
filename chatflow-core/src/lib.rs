//! # chatflow-core
//!
//! Core types for the chatflow streaming chat protocol: the AG-UI event
//! union, the UI message/part model, model-facing message shapes, partial
//! JSON parsing and id generation.
//!
//! ## Example
//!
//! ```rust
//! use chatflow_core::{Event, FinishReason, UiMessage};
//!
//! let user = UiMessage::user("What's the weather?");
//! assert_eq!(user.text_content(), "What's the weather?");
//!
//! let event = Event::text_message_content("msg_1", "Sunny");
//! assert!(!event.is_terminal());
//! assert!(Event::run_finished(FinishReason::Stop).is_terminal());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod events;
pub mod identifier;
pub mod message;
pub mod model;
pub mod partial_json;

pub use events::{
    ApprovalPayload, ApprovalRef, ErrorInfo, Event, EventMeta, FinishReason, ToolInputPayload,
    APPROVAL_REQUESTED, TOOL_INPUT_AVAILABLE,
};
pub use identifier::{
    generate_approval_id, generate_conversation_id, generate_message_id, generate_tool_call_id,
    now_millis, now_utc,
};
pub use message::{
    ContentKind, ContentPart, ContentSource, MessagePart, Role, SourceKind, TextPart,
    ThinkingPart, ToolApproval, ToolCallPart, ToolCallState, ToolResultPart, ToolResultState,
    UiMessage,
};
pub use model::{ModelContent, ModelMessage, ModelRole, ModelToolCall};
pub use partial_json::parse_partial;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::events::{Event, FinishReason, APPROVAL_REQUESTED, TOOL_INPUT_AVAILABLE};
    pub use crate::identifier::{generate_conversation_id, generate_message_id, now_millis};
    pub use crate::message::{
        MessagePart, Role, ToolCallPart, ToolCallState, ToolResultPart, ToolResultState, UiMessage,
    };
    pub use crate::model::{ModelMessage, ModelRole};
    pub use crate::partial_json::parse_partial;
}
