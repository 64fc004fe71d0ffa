//! Provider-agnostic contract for executing one backend model request.
//!
//! A run is exactly one request/response exchange with the model. Tool calls
//! announced by the model are surfaced as [`RunEvent::ToolCall`] and executed by
//! the caller, which then issues a follow-up run carrying the results. This
//! crate holds no transport details and no multi-run orchestration.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thread_protocol::Usage;

pub use tokio_util::sync::CancellationToken;

/// Identifier for one provider run.
pub type RunId = u64;

/// Cooperative cancellation handle shared between a turn and its provider runs.
pub type CancelSignal = CancellationToken;

/// Error returned while constructing/configuring a provider before any run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// One part of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    /// `image_url` is an `http(s)` URL or a base64 `data:` URL.
    Image { image_url: String },
}

/// Provider-neutral model-facing history item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunMessage {
    UserInput {
        content: Vec<MessageContent>,
    },
    AssistantText {
        text: String,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
    /// Out-of-band context for the model (plan updates, background events).
    /// Never counted as a user message.
    Note {
        text: String,
    },
}

impl RunMessage {
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::UserInput {
            content: vec![MessageContent::Text { text: text.into() }],
        }
    }

    #[must_use]
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::UserInput { .. })
    }
}

/// Input required to start a provider run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub run_id: RunId,
    /// Model override for this run; providers fall back to their own selection.
    pub model: Option<String>,
    pub instructions: String,
    pub messages: Vec<RunMessage>,
    pub tools: Vec<ToolDefinition>,
    pub reasoning_effort: Option<String>,
    /// JSON schema the final assistant message must satisfy.
    pub output_schema: Option<Value>,
    /// Stable key for backend-side prompt caching, usually the thread id.
    pub prompt_cache_key: Option<String>,
}

impl RunRequest {
    #[must_use]
    pub fn new(run_id: RunId, instructions: impl Into<String>, messages: Vec<RunMessage>) -> Self {
        Self {
            run_id,
            model: None,
            instructions: instructions.into(),
            messages,
            tools: Vec::new(),
            reasoning_effort: None,
            output_schema: None,
            prompt_cache_key: None,
        }
    }
}

/// Host-executed function tool offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Arguments of a model-issued tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Parsed(Value),
    /// The model sent text that is not a JSON object.
    Malformed { raw: String, error: String },
}

impl ToolArguments {
    /// Parses raw argument text. Empty text is an empty object.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Parsed(Value::Object(Default::default()));
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Self::Parsed(value),
            Ok(other) => Self::Malformed {
                raw: raw.to_string(),
                error: format!("expected a JSON object, got {}", value_type_name(&other)),
            },
            Err(error) => Self::Malformed {
                raw: raw.to_string(),
                error: error.to_string(),
            },
        }
    }

    /// Returns the JSON form recorded in history: the parsed value, or the raw text.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Parsed(value) => value.clone(),
            Self::Malformed { raw, .. } => Value::String(raw.clone()),
        }
    }
}

/// Provider request envelope for one host tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: ToolArguments,
}

/// Provider-emitted lifecycle event for a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        run_id: RunId,
    },
    TextDelta {
        run_id: RunId,
        text: String,
    },
    ReasoningDelta {
        run_id: RunId,
        text: String,
    },
    ToolCall {
        run_id: RunId,
        call: ToolCallRequest,
    },
    WebSearch {
        run_id: RunId,
        query: String,
    },
    Finished {
        run_id: RunId,
        usage: Option<Usage>,
    },
    Failed {
        run_id: RunId,
        error: String,
        code: Option<String>,
    },
    Cancelled {
        run_id: RunId,
    },
}

impl RunEvent {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Started { run_id }
            | Self::TextDelta { run_id, .. }
            | Self::ReasoningDelta { run_id, .. }
            | Self::ToolCall { run_id, .. }
            | Self::WebSearch { run_id, .. }
            | Self::Finished { run_id, .. }
            | Self::Failed { run_id, .. }
            | Self::Cancelled { run_id } => *run_id,
        }
    }

    /// Returns true when this event terminates the run lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing a run provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for executing one run request.
#[async_trait]
pub trait RunProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Executes one backend request and emits lifecycle events in provider order.
    ///
    /// Implementations emit `Started` first and end with exactly one terminal
    /// event. Returning `Err` means the run could not be driven at all.
    async fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut (dyn FnMut(RunEvent) + Send),
    ) -> Result<(), String>;
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        async_trait, CancelSignal, MessageContent, ProviderInitError, ProviderProfile, RunEvent,
        RunMessage, RunProvider, RunRequest, ToolArguments,
    };

    struct MinimalProvider;

    #[async_trait]
    impl RunProvider for MinimalProvider {
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                provider_id: "minimal".to_string(),
                model_id: "minimal-model".to_string(),
            }
        }

        async fn run(
            &self,
            req: RunRequest,
            _cancel: CancelSignal,
            emit: &mut (dyn FnMut(RunEvent) + Send),
        ) -> Result<(), String> {
            emit(RunEvent::Started { run_id: req.run_id });
            emit(RunEvent::Finished {
                run_id: req.run_id,
                usage: None,
            });
            Ok(())
        }
    }

    #[test]
    fn run_event_run_id_returns_event_run_id() {
        let run_id = 42;
        let events = [
            RunEvent::Started { run_id },
            RunEvent::TextDelta {
                run_id,
                text: "partial".to_string(),
            },
            RunEvent::WebSearch {
                run_id,
                query: "rust".to_string(),
            },
            RunEvent::Finished {
                run_id,
                usage: None,
            },
            RunEvent::Failed {
                run_id,
                error: "failure".to_string(),
                code: None,
            },
            RunEvent::Cancelled { run_id },
        ];

        for event in events {
            assert_eq!(event.run_id(), run_id);
        }
    }

    #[test]
    fn run_event_terminal_detection_matches_lifecycle() {
        assert!(!RunEvent::Started { run_id: 1 }.is_terminal());
        assert!(!RunEvent::ReasoningDelta {
            run_id: 1,
            text: "thinking".to_string(),
        }
        .is_terminal());
        assert!(RunEvent::Finished {
            run_id: 1,
            usage: None
        }
        .is_terminal());
        assert!(RunEvent::Failed {
            run_id: 1,
            error: "boom".to_string(),
            code: Some("server_error".to_string()),
        }
        .is_terminal());
        assert!(RunEvent::Cancelled { run_id: 1 }.is_terminal());
    }

    #[test]
    fn provider_init_error_preserves_message() {
        let error = ProviderInitError::new("missing api key");
        assert_eq!(error.message(), "missing api key");
        assert_eq!(error.to_string(), "missing api key");
    }

    #[test]
    fn tool_arguments_accept_objects_and_empty_text() {
        assert_eq!(
            ToolArguments::from_raw(r#"{"path":"README.md"}"#),
            ToolArguments::Parsed(json!({"path": "README.md"}))
        );
        assert_eq!(ToolArguments::from_raw("  "), ToolArguments::Parsed(json!({})));
    }

    #[test]
    fn tool_arguments_flag_malformed_payloads() {
        let truncated = ToolArguments::from_raw(r#"{"path": "REA"#);
        assert!(matches!(truncated, ToolArguments::Malformed { .. }));
        assert_eq!(truncated.to_value(), json!(r#"{"path": "REA"#));

        let array = ToolArguments::from_raw("[1,2]");
        assert!(matches!(
            array,
            ToolArguments::Malformed { error, .. } if error.contains("array")
        ));
    }

    #[test]
    fn run_messages_serialize_with_type_tags() {
        let message = RunMessage::UserInput {
            content: vec![
                MessageContent::Text {
                    text: "describe".to_string(),
                },
                MessageContent::Image {
                    image_url: "data:image/png;base64,AAAA".to_string(),
                },
            ],
        };

        assert_eq!(
            serde_json::to_value(&message).expect("message should serialize"),
            json!({
                "type": "user_input",
                "content": [
                    {"type": "text", "text": "describe"},
                    {"type": "image", "image_url": "data:image/png;base64,AAAA"},
                ],
            })
        );
        assert!(message.is_user_input());
        assert!(!RunMessage::Note {
            text: "background".to_string()
        }
        .is_user_input());
    }

    #[tokio::test]
    async fn minimal_provider_emits_started_then_terminal() {
        let provider = MinimalProvider;
        let mut events = Vec::new();

        provider
            .run(
                RunRequest::new(7, "system", vec![RunMessage::user_text("hi")]),
                CancelSignal::new(),
                &mut |event| events.push(event),
            )
            .await
            .expect("minimal provider should run");

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::Started { run_id: 7 }));
        assert!(events[1].is_terminal());
        assert_eq!(provider.profile().model_id, "minimal-model");
    }
}
