//! # chatflow-processor
//!
//! The deterministic state machine at the heart of chatflow: pure
//! message mutators, chunk-emission strategies, the
//! [`StreamProcessor`] that folds protocol events into a conversation,
//! and recording/replay support.
//!
//! ## Example
//!
//! ```rust
//! use chatflow_core::{Event, FinishReason};
//! use chatflow_processor::StreamProcessor;
//!
//! let mut processor = StreamProcessor::new();
//! processor.prepare_assistant_message();
//! processor.process_chunk(Event::text_message_start("m1"));
//! processor.process_chunk(Event::text_message_content("m1", "Hello"));
//! processor.process_chunk(Event::run_finished(FinishReason::Stop));
//!
//! assert_eq!(processor.messages()[0].text_content(), "Hello");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod emission;
pub mod mutators;
pub mod processor;
pub mod recording;

pub use emission::{Debounced, EmitStrategy, Immediate, SentenceBoundary};
pub use processor::{
    ApprovalRequest, ProcessorResult, ProcessorUpdate, StreamProcessor, ToolCallRequest,
};
pub use recording::StreamRecording;
