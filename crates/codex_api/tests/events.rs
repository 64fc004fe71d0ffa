use codex_api::events::{CodexResponseStatus, CodexStreamEvent, CodexUsage};

#[test]
fn events_status_from_str() {
    assert_eq!(
        CodexResponseStatus::parse("completed"),
        Some(CodexResponseStatus::Completed)
    );
    assert_eq!(
        CodexResponseStatus::parse("in_progress"),
        Some(CodexResponseStatus::InProgress)
    );
    assert_eq!(
        CodexResponseStatus::parse("queued"),
        Some(CodexResponseStatus::Queued)
    );
    assert_eq!(CodexResponseStatus::parse("unknown"), None);
}

#[test]
fn completed_event_serializes_status_and_usage() {
    let event = CodexStreamEvent::ResponseCompleted {
        status: CodexResponseStatus::Completed,
        usage: Some(CodexUsage {
            input_tokens: 3,
            output_tokens: 2,
            ..CodexUsage::default()
        }),
    };

    let json = serde_json::to_value(&event).expect("serialize completed event");
    assert_eq!(json["type"], "response.completed");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["usage"]["input_tokens"], 3);
}

#[test]
fn tool_call_variant_keeps_raw_argument_text() {
    let event = CodexStreamEvent::ToolCallRequested {
        id: Some("fc_1".to_string()),
        call_id: Some("call_1".to_string()),
        tool_name: Some("read_file".to_string()),
        arguments: Some("{\"path\": \"README.md\"".to_string()),
    };

    let json = serde_json::to_value(&event).expect("serialize tool call event");
    assert_eq!(json["type"], "response.output_item.function_call");
    assert_eq!(json["call_id"], "call_1");
    assert_eq!(json["tool_name"], "read_file");
    assert_eq!(json["arguments"], "{\"path\": \"README.md\"");
}
