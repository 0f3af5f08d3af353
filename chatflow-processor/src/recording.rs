//! Stream recording and deterministic replay.
//!
//! A recording captures one stream's input events (with their
//! timestamps) together with the final result. Replaying it on a fresh
//! processor reproduces the exact message list and result, which makes
//! recordings the foundation of regression fixtures: capture a live
//! session once, assert against it forever.

use crate::processor::{ProcessorResult, StreamProcessor};
use chatflow_core::{Event, UiMessage};
use serde::{Deserialize, Serialize};

/// One stream's events and outcome, as captured by
/// [`StreamProcessor::start_recording`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecording {
    /// The id reserved by `prepare_assistant_message`, so replays bind
    /// lazily created messages to the same id.
    pub prepared_message_id: Option<String>,
    /// Every input event, in arrival order.
    pub events: Vec<Event>,
    /// The outcome observed at capture time.
    pub result: ProcessorResult,
}

impl StreamProcessor {
    /// The recording captured so far, if recording was started.
    #[must_use]
    pub fn get_recording(&self) -> Option<StreamRecording> {
        self.recorded_events().map(|events| StreamRecording {
            prepared_message_id: self.last_prepared_id().map(str::to_string),
            events: events.to_vec(),
            result: self.result(),
        })
    }

    /// Replay a recording on a fresh processor, returning the
    /// reconstructed messages and result.
    #[must_use]
    pub fn replay(recording: &StreamRecording) -> (Vec<UiMessage>, ProcessorResult) {
        let mut processor = StreamProcessor::new();
        match &recording.prepared_message_id {
            Some(id) => processor.prepare_with_id(id.clone()),
            None => {
                let _ = processor.prepare_assistant_message();
            }
        }
        for event in &recording.events {
            let _ = processor.process_chunk(event.clone());
        }
        if !processor.is_done() {
            let _ = processor.finalize_stream();
        }
        let result = processor.result();
        (processor.get_messages(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_core::events::{FinishReason, APPROVAL_REQUESTED};
    use serde_json::json;

    fn record(events: Vec<Event>) -> (StreamProcessor, StreamRecording) {
        let mut processor = StreamProcessor::new();
        processor.start_recording();
        processor.prepare_assistant_message();
        for event in events {
            processor.process_chunk(event);
        }
        let recording = processor.get_recording().expect("recording active");
        (processor, recording)
    }

    #[test]
    fn test_replay_reproduces_text_stream() {
        let (original, recording) = record(vec![
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "Hel"),
            Event::text_message_content("m1", "lo"),
            Event::run_finished(FinishReason::Stop),
        ]);

        let (messages, result) = StreamProcessor::replay(&recording);
        assert_eq!(messages, original.get_messages());
        assert_eq!(result, original.result());
    }

    #[test]
    fn test_replay_reproduces_tool_stream_with_lazy_id() {
        // No TEXT_MESSAGE_START: the message id comes from the reserved
        // manual id, which the recording pins down.
        let (original, recording) = record(vec![
            Event::tool_call_start("t1", "get"),
            Event::tool_call_args("t1", "{\"a\":"),
            Event::tool_call_args("t1", "1}"),
            Event::tool_call_result("t1", "42"),
            Event::custom(
                APPROVAL_REQUESTED,
                json!({"toolCallId": "t1", "approval": {"id": "a1"}}),
            ),
            Event::run_finished(FinishReason::Stop),
        ]);

        let (messages, result) = StreamProcessor::replay(&recording);
        assert_eq!(messages, original.get_messages());
        assert_eq!(result, original.result());
        assert!(!messages.is_empty());
    }

    #[test]
    fn test_replay_idempotent() {
        let (_, recording) = record(vec![
            Event::text_message_content("m1", "once"),
            Event::run_error("boom"),
        ]);
        let first = StreamProcessor::replay(&recording);
        let second = StreamProcessor::replay(&recording);
        assert_eq!(first, second);
    }

    #[test]
    fn test_recording_serde_roundtrip() {
        let (_, recording) = record(vec![
            Event::text_message_content("m1", "persisted"),
            Event::run_finished(FinishReason::Stop),
        ]);
        let json = serde_json::to_string(&recording).unwrap();
        let back: StreamRecording = serde_json::from_str(&json).unwrap();
        assert_eq!(back, recording);

        let (messages, result) = StreamProcessor::replay(&back);
        assert_eq!(result, recording.result);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_no_recording_without_start() {
        let mut processor = StreamProcessor::new();
        processor.prepare_assistant_message();
        processor.process_chunk(Event::run_finished(FinishReason::Stop));
        assert!(processor.get_recording().is_none());
    }
}
