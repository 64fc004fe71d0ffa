use serde_json::Value;

use crate::events::{CodexResponseStatus, CodexStreamEvent, CodexUsage};

/// Incremental parser for SSE text streams.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<CodexStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" || payload.is_empty() {
                    continue;
                }

                match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => {
                        if let Some(event) = map_event(value) {
                            events.push(event);
                        }
                    }
                    Err(error) => {
                        tracing::debug!(%error, "skipping malformed SSE data frame");
                    }
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<CodexStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|value| value.as_str())
        .map(ToString::to_string)
}

fn map_event(value: Value) -> Option<CodexStreamEvent> {
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "response.output_text.delta" => Some(CodexStreamEvent::OutputTextDelta {
            delta: str_field(&value, "delta").unwrap_or_default(),
        }),
        "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
            Some(CodexStreamEvent::ReasoningSummaryTextDelta {
                delta: str_field(&value, "delta").unwrap_or_default(),
            })
        }
        "response.output_item.done" => map_output_item(value.get("item")?),
        "response.completed" | "response.done" | "response.incomplete" => {
            let response = value.get("response");
            let default_status = if event_type == "response.incomplete" {
                CodexResponseStatus::Incomplete
            } else {
                CodexResponseStatus::Completed
            };
            let status = response
                .and_then(|response| response.get("status"))
                .and_then(|status| status.as_str())
                .and_then(CodexResponseStatus::parse)
                .unwrap_or(default_status);
            let usage = response
                .and_then(|response| response.get("usage"))
                .map(parse_usage);

            // Keep alias handling explicit so callers receive normalized completion.
            Some(CodexStreamEvent::ResponseCompleted { status, usage })
        }
        "response.failed" => {
            let error = value
                .get("response")
                .and_then(|response| response.get("error"));
            Some(CodexStreamEvent::ResponseFailed {
                code: error.and_then(|error| str_field(error, "code")),
                message: error.and_then(|error| str_field(error, "message")),
            })
        }
        "error" => Some(CodexStreamEvent::Error {
            code: str_field(&value, "code"),
            message: str_field(&value, "message"),
        }),
        _ => None,
    }
}

fn map_output_item(item: &Value) -> Option<CodexStreamEvent> {
    let id = str_field(item, "id");
    match item.get("type").and_then(|value| value.as_str()) {
        Some("function_call") => Some(CodexStreamEvent::ToolCallRequested {
            id,
            call_id: str_field(item, "call_id"),
            tool_name: str_field(item, "name"),
            arguments: str_field(item, "arguments"),
        }),
        Some("message") => {
            let text = item
                .get("content")
                .and_then(|content| content.as_array())
                .map(|parts| {
                    parts
                        .iter()
                        .filter(|part| {
                            part.get("type").and_then(|value| value.as_str())
                                == Some("output_text")
                        })
                        .filter_map(|part| part.get("text").and_then(|value| value.as_str()))
                        .collect::<String>()
                })
                .unwrap_or_default();
            Some(CodexStreamEvent::MessageDone { id, text })
        }
        Some("web_search_call") => Some(CodexStreamEvent::WebSearchCall {
            id,
            query: item
                .get("action")
                .and_then(|action| str_field(action, "query")),
        }),
        _ => Some(CodexStreamEvent::OutputItemDone {
            id,
            status: item
                .get("status")
                .and_then(|value| value.as_str())
                .and_then(CodexResponseStatus::parse),
        }),
    }
}

fn parse_usage(usage: &Value) -> CodexUsage {
    let count = |value: Option<&Value>| value.and_then(Value::as_u64).unwrap_or(0);
    CodexUsage {
        input_tokens: count(usage.get("input_tokens")),
        cached_input_tokens: count(
            usage
                .get("input_tokens_details")
                .and_then(|details| details.get("cached_tokens")),
        ),
        output_tokens: count(usage.get("output_tokens")),
        reasoning_tokens: count(
            usage
                .get("output_tokens_details")
                .and_then(|details| details.get("reasoning_tokens")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::SseStreamParser;
    use crate::events::{CodexStreamEvent, CodexUsage};

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut events = Vec::new();

        events.extend(
            parser.feed(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hello\"}\n\n"),
        );
        assert_eq!(events.len(), 1);

        events.extend(parser.feed(b"data: [DONE]\n\n"));
        assert_eq!(events.len(), 1);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn crlf_framed_streams_are_normalized() {
        let events = SseStreamParser::parse_frames(
            "event: response.output_text.delta\r\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"x\"}\r\n\r\n",
        );
        assert_eq!(
            events,
            vec![CodexStreamEvent::OutputTextDelta {
                delta: "x".to_string()
            }]
        );
    }

    #[test]
    fn completion_usage_reads_nested_details() {
        let events = SseStreamParser::parse_frames(concat!(
            "data: {\"type\":\"response.completed\",\"response\":{\"status\":\"completed\",",
            "\"usage\":{\"input_tokens\":20,\"input_tokens_details\":{\"cached_tokens\":5},",
            "\"output_tokens\":9,\"output_tokens_details\":{\"reasoning_tokens\":4}}}}\n\n"
        ));

        assert!(matches!(
            events.as_slice(),
            [CodexStreamEvent::ResponseCompleted {
                usage: Some(CodexUsage {
                    input_tokens: 20,
                    cached_input_tokens: 5,
                    output_tokens: 9,
                    reasoning_tokens: 4,
                }),
                ..
            }]
        ));
    }
}
