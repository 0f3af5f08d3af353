//! End-to-end tests across the full pipeline:
//! connection → session queue → subscription → processor → messages.

use chatflow::prelude::*;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn text_script(message_id: &str, chunks: &[&str]) -> Vec<Event> {
    let mut events = vec![Event::text_message_start(message_id)];
    for chunk in chunks {
        events.push(Event::text_message_content(message_id, *chunk));
    }
    events.push(Event::run_finished(FinishReason::Stop));
    events
}

#[tokio::test]
async fn order_is_preserved_end_to_end() {
    // Property: the event sequence observed behind the session queue
    // equals the adapter's sequence.
    let script = vec![
        Event::text_message_start("m1"),
        Event::text_message_content("m1", "a"),
        Event::tool_call_start("t1", "f"),
        Event::tool_call_args("t1", "{}"),
        Event::tool_call_end("t1"),
        Event::text_message_content("m1", "b"),
        Event::run_finished(FinishReason::Stop),
    ];
    let session = QueueSession::new(Arc::new(InProcessConnection::new(script.clone())));

    let mut subscription = session.subscribe(CancellationToken::new());
    session
        .send(&[], None, CancellationToken::new())
        .await
        .unwrap();

    let mut observed = Vec::new();
    while let Some(item) = subscription.next().await {
        let event = item.unwrap();
        let terminal = event.is_terminal();
        observed.push(event);
        if terminal {
            break;
        }
    }
    assert_eq!(observed, script);
}

#[tokio::test]
async fn full_pipeline_produces_ordered_parts() {
    let connection = Arc::new(InProcessConnection::new(vec![
        Event::text_message_start("m1"),
        Event::text_message_content("m1", "Let me check. "),
        Event::tool_call_start("t1", "get_weather"),
        Event::tool_call_args("t1", "{\"city\":\"Berlin\"}"),
        Event::tool_call_result("t1", "{\"temp\": 21}"),
        Event::text_message_content("m1", "It's 21 degrees."),
        Event::run_finished(FinishReason::Stop),
    ]));
    let client = ChatClient::new(Arc::new(QueueSession::new(connection)));

    client.send_message("weather in berlin?").await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    let answer = &messages[1];
    assert_eq!(answer.parts.len(), 4);
    assert!(answer.parts[0].is_text());
    assert!(answer.parts[1].is_tool_call());
    assert!(answer.parts[2].is_tool_result());
    assert!(answer.parts[3].is_text());
    assert_eq!(answer.text_content(), "Let me check. It's 21 degrees.");

    // The model round-trip keeps the tool exchange.
    let model = client.to_model_messages();
    assert_eq!(model.len(), 3);
    assert_eq!(model[2].tool_call_id.as_deref(), Some("t1"));
}

#[tokio::test]
async fn supersession_keeps_only_second_answer() {
    // Property: reload produces the message list the second stream
    // would have produced alone, on top of the preserved user prefix.
    let connection = Arc::new(InProcessConnection::with_scripts(vec![
        text_script("m1", &["first ", "answer"]),
        text_script("m2", &["second answer"]),
    ]));
    let client = ChatClient::new(Arc::new(QueueSession::new(connection)));

    client.send_message("question").await.unwrap();
    client.reload().await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text_content(), "question");
    assert_eq!(messages[1].id, "m2");
    assert_eq!(messages[1].text_content(), "second answer");
}

#[tokio::test]
async fn multi_turn_conversation_accumulates() {
    let connection = Arc::new(InProcessConnection::with_scripts(vec![
        text_script("m1", &["four"]),
        text_script("m2", &["five"]),
    ]));
    let client = ChatClient::new(Arc::new(QueueSession::new(connection)));

    client.send_message("2+2?").await.unwrap();
    client.send_message("and one more?").await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].text_content(), "four");
    assert_eq!(messages[3].text_content(), "five");
}

#[tokio::test]
async fn client_tool_round_trip_through_real_queue() {
    let connection = Arc::new(InProcessConnection::with_scripts(vec![
        vec![
            Event::tool_call_start("t1", "read_clipboard"),
            Event::tool_call_end("t1"),
            Event::custom(
                TOOL_INPUT_AVAILABLE,
                json!({"toolCallId": "t1", "toolName": "read_clipboard", "input": {}}),
            ),
            Event::run_finished(FinishReason::ToolCalls),
        ],
        text_script("m2", &["Your clipboard says hi."]),
    ]));
    let client = ChatClient::builder(Arc::new(QueueSession::new(connection.clone())))
        .tool(
            "read_clipboard",
            Arc::new(FnTool::new(|_| async move { Ok(json!("hi")) })),
        )
        .build();

    client.send_message("what's on my clipboard?").await.unwrap();

    let messages = client.messages();
    let tool_turn = &messages[1];
    assert_eq!(
        tool_turn.tool_call("t1").unwrap().state,
        ToolCallState::InputComplete
    );
    assert_eq!(
        tool_turn.tool_result("t1").unwrap().state,
        ToolResultState::Complete
    );
    assert_eq!(
        messages.last().unwrap().text_content(),
        "Your clipboard says hi."
    );
    assert_eq!(connection.remaining_scripts(), 0);
}

#[tokio::test]
async fn recording_replays_to_identical_conversation() {
    let events = vec![
        Event::text_message_start("m1"),
        Event::text_message_content("m1", "deterministic "),
        Event::tool_call_start("t1", "get"),
        Event::tool_call_args("t1", "{\"q\":1}"),
        Event::tool_call_result("t1", "ok"),
        Event::text_message_content("m1", "replay"),
        Event::run_finished(FinishReason::Stop),
    ];

    let mut processor = StreamProcessor::new();
    processor.start_recording();
    processor.prepare_assistant_message();
    for event in events {
        processor.process_chunk(event);
    }

    let recording = processor.get_recording().unwrap();
    let (messages, result) = StreamProcessor::replay(&recording);
    assert_eq!(messages, processor.get_messages());
    assert_eq!(result, processor.result());
    assert_eq!(result.finish_reason, Some(FinishReason::Stop));
}
