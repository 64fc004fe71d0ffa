use codex_api::{events::CodexResponseStatus, events::CodexStreamEvent, SseStreamParser};

#[test]
fn sse_framing_parses_done_and_deltas() {
    let payload = concat!(
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"hel\"}\n\n",
        "data: [DONE]\n\n",
        "data: {\"type\":\"response.reasoning_summary_text.delta\",\"delta\":\"ok\"}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        CodexStreamEvent::OutputTextDelta { .. }
    ));
    assert!(matches!(
        events[1],
        CodexStreamEvent::ReasoningSummaryTextDelta { .. }
    ));
}

#[test]
fn sse_parser_maps_done_alias_and_failed() {
    let payload = concat!(
        "data: {\"type\":\"response.completed\",\"response\":{\"status\":\"completed\"}}\n\n",
        "data: {\"type\":\"response.done\",\"response\":{\"status\":\"in_progress\"}}\n\n",
        "data: {\"type\":\"response.failed\",\"response\":{\"error\":{\"message\":\"boom\"}}}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 3);

    if let CodexStreamEvent::ResponseCompleted { status, .. } = &events[0] {
        assert_eq!(*status, CodexResponseStatus::Completed);
    } else {
        panic!("first event should be completed");
    }

    if let CodexStreamEvent::ResponseCompleted { status, .. } = &events[1] {
        assert_eq!(*status, CodexResponseStatus::InProgress);
    } else {
        panic!("second event should be done alias");
    }

    assert!(matches!(events[2], CodexStreamEvent::ResponseFailed { .. }));
}

#[test]
fn sse_parser_ignores_unknown_and_malformed() {
    let payload = concat!(
        "data: {\"type\":\"unknown.event\",\"foo\":\"bar\"}\n\n",
        "data: {broken-json\n\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"x\"}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        CodexStreamEvent::OutputTextDelta { .. }
    ));
}

#[test]
fn sse_parser_handles_split_frames_incrementally() {
    let mut parser = SseStreamParser::default();
    assert!(parser
        .feed(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"abc\"")
        .is_empty());
    let mut events = parser.feed(b"}\n\n");
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events.pop(),
        Some(CodexStreamEvent::OutputTextDelta { .. })
    ));
}

#[test]
fn sse_parser_skips_empty_data_frames() {
    let payload = concat!(
        "data: \n\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"done\"}\n\n"
    );
    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        CodexStreamEvent::OutputTextDelta { .. }
    ));
}

#[test]
fn sse_parser_ignores_incomplete_trailing_bytes() {
    let mut parser = SseStreamParser::default();
    assert!(parser
        .feed(b"data: {\"type\":\"response.reasoning_summary_text.delta\",\"delta\":\"nope\"")
        .is_empty());
    assert!(!parser.is_empty_buffer());
}

#[test]
fn sse_parser_maps_function_call_items_with_raw_arguments() {
    let payload = concat!(
        "data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"function_call\",",
        "\"id\":\"fc_1\",\"call_id\":\"call_1\",\"name\":\"grep\",\"arguments\":\"{\\\"pattern\\\":\"}}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(
        events,
        vec![CodexStreamEvent::ToolCallRequested {
            id: Some("fc_1".to_string()),
            call_id: Some("call_1".to_string()),
            tool_name: Some("grep".to_string()),
            arguments: Some("{\"pattern\":".to_string()),
        }]
    );
}

#[test]
fn sse_parser_maps_message_and_web_search_items() {
    let payload = concat!(
        "data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"message\",\"id\":\"msg_1\",",
        "\"content\":[{\"type\":\"output_text\",\"text\":\"Hel\"},{\"type\":\"output_text\",\"text\":\"lo\"}]}}\n\n",
        "data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"web_search_call\",\"id\":\"ws_1\",",
        "\"action\":{\"query\":\"rust async\"}}}\n\n",
        "data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"reasoning\",\"id\":\"rs_1\"}}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(
        events,
        vec![
            CodexStreamEvent::MessageDone {
                id: Some("msg_1".to_string()),
                text: "Hello".to_string(),
            },
            CodexStreamEvent::WebSearchCall {
                id: Some("ws_1".to_string()),
                query: Some("rust async".to_string()),
            },
            CodexStreamEvent::OutputItemDone {
                id: Some("rs_1".to_string()),
                status: None,
            },
        ]
    );
}

#[test]
fn sse_parser_keeps_failure_codes() {
    let events = SseStreamParser::parse_frames(
        "data: {\"type\":\"response.failed\",\"response\":{\"error\":{\"code\":\"rate_limit_exceeded\",\"message\":\"slow down\"}}}\n\n",
    );
    assert_eq!(
        events,
        vec![CodexStreamEvent::ResponseFailed {
            code: Some("rate_limit_exceeded".to_string()),
            message: Some("slow down".to_string()),
        }]
    );
}
