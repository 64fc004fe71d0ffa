//! Responses API-backed implementation of the shared `agent_provider` contract.
//!
//! This adapter translates provider-neutral [`RunMessage`] history into
//! Responses input items and maps `codex_api` stream events back into the
//! deterministic `RunEvent` lifecycle the thread engine expects.

use std::sync::Arc;
use std::time::Duration;

use agent_provider::{
    CancelSignal, MessageContent, ProviderInitError, ProviderProfile, RunEvent,
    RunMessage, RunProvider, RunRequest, ToolArguments, ToolCallRequest, ToolDefinition,
};
use async_trait::async_trait;
use codex_api::payload::CodexReasoning;
use codex_api::{
    CodexApiClient, CodexApiConfig, CodexApiError, CodexRequest, CodexResponseStatus,
    CodexStreamEvent, CodexUsage,
};
use serde_json::{json, Value};
use thread_protocol::Usage;

/// Stable provider identifier used by startup selection.
pub const CODEX_API_PROVIDER_ID: &str = "codex-api";

/// Model used when neither the config nor the request names one.
pub const DEFAULT_MODEL: &str = "gpt-5.1-codex";

/// Runtime configuration for the Responses API provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexApiProviderConfig {
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub session_id: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
}

impl CodexApiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            session_id: None,
            timeout: None,
            max_retries: 0,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn into_codex_api_config(self) -> CodexApiConfig {
        let mut config = CodexApiConfig::new(self.api_key).with_max_retries(self.max_retries);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(session_id) = self.session_id {
            config = config.with_session_id(session_id);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

#[async_trait]
trait StreamClient: Send + Sync {
    async fn stream(
        &self,
        request: &CodexRequest,
        cancel: &CancelSignal,
        on_event: &mut (dyn FnMut(CodexStreamEvent) + Send),
    ) -> Result<Option<CodexResponseStatus>, CodexApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: CodexApiClient,
}

#[async_trait]
impl StreamClient for DefaultStreamClient {
    async fn stream(
        &self,
        request: &CodexRequest,
        cancel: &CancelSignal,
        on_event: &mut (dyn FnMut(CodexStreamEvent) + Send),
    ) -> Result<Option<CodexResponseStatus>, CodexApiError> {
        self.client
            .stream_with_handler(request, Some(cancel), |event| on_event(event))
            .await
    }
}

/// `RunProvider` adapter backed by `codex_api` transport primitives.
pub struct CodexApiProvider {
    model: String,
    stream_client: Arc<dyn StreamClient>,
}

impl CodexApiProvider {
    /// Creates a provider using real Responses API transport.
    pub fn new(config: CodexApiProviderConfig) -> Result<Self, ProviderInitError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderInitError::new(
                "Failed to initialize codex-api provider: API key is required",
            ));
        }
        let model = sanitize_model(config.model.as_deref());
        let stream_client = Arc::new(DefaultStreamClient {
            client: CodexApiClient::new(config.into_codex_api_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model,
            stream_client,
        })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(model: Option<&str>, stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            model: sanitize_model(model),
            stream_client,
        }
    }

    fn build_request(&self, req: &RunRequest) -> CodexRequest {
        let model = req
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(&self.model);
        let instructions = Some(req.instructions.clone()).filter(|text| !text.trim().is_empty());

        let mut request = CodexRequest::new(model, responses_input(&req.messages), instructions);
        request.tools = req.tools.iter().map(function_tool).collect();
        request.prompt_cache_key = req.prompt_cache_key.clone();
        if let Some(effort) = req.reasoning_effort.clone() {
            request.reasoning = Some(CodexReasoning {
                effort: Some(effort),
                summary: None,
            });
        }
        if let Some(schema) = req.output_schema.clone() {
            request = request.with_output_schema(schema);
        }
        request
    }
}

#[async_trait]
impl RunProvider for CodexApiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: CODEX_API_PROVIDER_ID.to_string(),
            model_id: self.model.clone(),
        }
    }

    async fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut (dyn FnMut(RunEvent) + Send),
    ) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });

        if cancel.is_cancelled() {
            emit(RunEvent::Cancelled { run_id });
            return Ok(());
        }

        let request = self.build_request(&req);
        let mut mapper = StreamMapper::new(run_id);
        let outcome = self
            .stream_client
            .stream(&request, &cancel, &mut |event| mapper.map(event, &mut *emit))
            .await;

        match outcome {
            Ok(terminal) => mapper.finish(terminal, emit),
            Err(CodexApiError::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Err(error) => {
                tracing::warn!(run_id, %error, "Responses request failed");
                emit(RunEvent::Failed {
                    run_id,
                    code: error.code(),
                    error: format!("Responses request failed: {error}"),
                })
            }
        }

        Ok(())
    }
}

/// Folds normalized stream events into run events for one request.
struct StreamMapper {
    run_id: u64,
    streamed_text: bool,
    usage: Option<Usage>,
    next_call: usize,
}

impl StreamMapper {
    fn new(run_id: u64) -> Self {
        Self {
            run_id,
            streamed_text: false,
            usage: None,
            next_call: 0,
        }
    }

    fn map(&mut self, event: CodexStreamEvent, emit: &mut (dyn FnMut(RunEvent) + Send)) {
        let run_id = self.run_id;
        match event {
            CodexStreamEvent::OutputTextDelta { delta } => {
                if !delta.is_empty() {
                    self.streamed_text = true;
                    emit(RunEvent::TextDelta {
                        run_id,
                        text: delta,
                    });
                }
            }
            CodexStreamEvent::ReasoningSummaryTextDelta { delta } => {
                if !delta.is_empty() {
                    emit(RunEvent::ReasoningDelta {
                        run_id,
                        text: delta,
                    });
                }
            }
            CodexStreamEvent::MessageDone { text, .. } => {
                // Backends that skip deltas still deliver the full message here.
                if !self.streamed_text && !text.is_empty() {
                    emit(RunEvent::TextDelta { run_id, text });
                }
                self.streamed_text = false;
            }
            CodexStreamEvent::ToolCallRequested {
                id,
                call_id,
                tool_name,
                arguments,
            } => {
                let Some(tool_name) = tool_name.filter(|name| !name.is_empty()) else {
                    tracing::warn!(run_id, "dropping function call without a name");
                    return;
                };
                self.next_call += 1;
                let call_id = call_id
                    .or(id)
                    .unwrap_or_else(|| format!("call_{run_id}_{}", self.next_call));
                emit(RunEvent::ToolCall {
                    run_id,
                    call: ToolCallRequest {
                        call_id,
                        tool_name,
                        arguments: ToolArguments::from_raw(arguments.as_deref().unwrap_or("")),
                    },
                });
            }
            CodexStreamEvent::WebSearchCall { query, .. } => emit(RunEvent::WebSearch {
                run_id,
                query: query.unwrap_or_default(),
            }),
            CodexStreamEvent::ResponseCompleted { usage, .. } => {
                self.usage = usage.map(convert_usage);
            }
            CodexStreamEvent::OutputItemDone { .. }
            | CodexStreamEvent::ResponseFailed { .. }
            | CodexStreamEvent::Error { .. } => {}
        }
    }

    fn finish(
        self,
        terminal: Option<CodexResponseStatus>,
        emit: &mut (dyn FnMut(RunEvent) + Send),
    ) {
        let run_id = self.run_id;
        match terminal {
            Some(CodexResponseStatus::Completed) => emit(RunEvent::Finished {
                run_id,
                usage: self.usage,
            }),
            Some(CodexResponseStatus::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Some(CodexResponseStatus::Failed) => emit(RunEvent::Failed {
                run_id,
                error: "Responses request failed".to_string(),
                code: None,
            }),
            Some(status) => emit(RunEvent::Failed {
                run_id,
                error: format!(
                    "Response ended with non-complete terminal status '{}'",
                    status.as_str()
                ),
                code: Some(status.as_str().to_string()),
            }),
            None => emit(RunEvent::Failed {
                run_id,
                error: "Response stream ended without terminal status".to_string(),
                code: Some("stream_incomplete".to_string()),
            }),
        }
    }
}

/// Converts run history into the Responses `input` array.
fn responses_input(messages: &[RunMessage]) -> Value {
    let items = messages
        .iter()
        .map(|message| match message {
            RunMessage::UserInput { content } => json!({
                "role": "user",
                "content": content.iter().map(user_content_part).collect::<Vec<_>>(),
            }),
            RunMessage::AssistantText { text } => json!({
                "role": "assistant",
                "content": [{"type": "output_text", "text": text}],
            }),
            RunMessage::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": call_id,
                "name": tool_name,
                "arguments": arguments_text(arguments),
            }),
            RunMessage::ToolResult {
                call_id, content, ..
            } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": content,
            }),
            RunMessage::Note { text } => json!({
                "role": "developer",
                "content": [{"type": "input_text", "text": text}],
            }),
        })
        .collect();
    Value::Array(items)
}

fn user_content_part(part: &MessageContent) -> Value {
    match part {
        MessageContent::Text { text } => json!({"type": "input_text", "text": text}),
        MessageContent::Image { image_url } => {
            json!({"type": "input_image", "image_url": image_url})
        }
    }
}

fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn function_tool(tool: &ToolDefinition) -> Value {
    let mut value = json!({
        "type": "function",
        "name": tool.name,
        "parameters": tool.input_schema,
        "strict": false,
    });
    if let Some(description) = tool.description.as_deref() {
        value["description"] = Value::String(description.to_string());
    }
    value
}

fn convert_usage(usage: CodexUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        cached_input_tokens: usage.cached_input_tokens,
        output_tokens: usage.output_tokens,
        reasoning_tokens: usage.reasoning_tokens,
    }
}

fn sanitize_model(model: Option<&str>) -> String {
    model
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string()
}

fn map_init_error(error: CodexApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize codex-api provider: {error}"))
}
