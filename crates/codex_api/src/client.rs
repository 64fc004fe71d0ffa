use std::future::Future;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::config::CodexApiConfig;
use crate::error::{has_usage_limit_message, parse_error_message, CodexApiError};
use crate::events::{CodexResponseStatus, CodexStreamEvent};
use crate::headers::build_headers;
use crate::payload::CodexRequest;
use crate::retry::{is_retryable_http_error, retry_delay_ms};
use crate::sse::SseStreamParser;
use crate::url::normalize_responses_url;

#[derive(Debug)]
pub struct CodexApiClient {
    http: Client,
    config: CodexApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<CodexStreamEvent>,
    pub terminal: Option<CodexResponseStatus>,
}

impl CodexApiClient {
    pub fn new(config: CodexApiConfig) -> Result<Self, CodexApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(CodexApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CodexApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_responses_url(&self.config.base_url)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, CodexApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| CodexApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(&value)
                    .map_err(|_| CodexApiError::InvalidHeader(format!("invalid value for {key}")))?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &CodexRequest,
    ) -> Result<reqwest::RequestBuilder, CodexApiError> {
        validate_request_payload_shape(request)?;

        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let payload = self.request_with_transport_defaults(request);
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    fn request_with_transport_defaults(&self, request: &CodexRequest) -> CodexRequest {
        let mut payload = request.clone();
        payload.store = false;
        payload.stream = true;
        if payload.text.verbosity.trim().is_empty() {
            payload.text.verbosity = "medium".to_owned();
        }
        payload.include = vec!["reasoning.encrypted_content".to_owned()];
        payload.tool_choice = Some("auto".to_owned());
        if payload.prompt_cache_key.is_none() {
            if let Some(session_id) = self
                .config
                .session_id
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                payload.prompt_cache_key = Some(session_id.to_string());
            }
        }
        if let Some(reasoning) = payload.reasoning.as_mut() {
            if let Some(effort) = reasoning.effort.clone() {
                reasoning.effort = Some(clamp_reasoning_effort(&payload.model, &effort));
                if reasoning.summary.is_none() {
                    reasoning.summary = Some("auto".to_owned());
                }
            }
        }
        payload
    }

    /// Sends `request`, retrying transient failures up to `config.max_retries` times.
    pub async fn send_with_retry(
        &self,
        request: &CodexRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Response, CodexApiError> {
        let max_retries = self.config.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(CodexApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    last_status = Some(response.status());
                    let status = response.status();
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());
                    let should_retry = is_retryable_http_error(status.as_u16(), &body)
                        && !has_usage_limit_message(&message);

                    if attempt < max_retries && should_retry {
                        tracing::warn!(attempt, %status, "retrying Responses request");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(CodexApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    if max_retries == 0 {
                        return Err(error);
                    }
                    last_error = Some(message.clone());
                    if attempt < max_retries && !has_usage_limit_message(&message) {
                        tracing::warn!(attempt, error = %message, "retrying Responses request");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(CodexApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(CodexApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Streams one response, handing each normalized event to `on_event` as it arrives.
    pub async fn stream_with_handler<F>(
        &self,
        request: &CodexRequest,
        cancellation: Option<&CancellationToken>,
        mut on_event: F,
    ) -> Result<Option<CodexResponseStatus>, CodexApiError>
    where
        F: FnMut(CodexStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut terminal = None;

        while let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? {
            let chunk = chunk.map_err(CodexApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut terminal, &mut on_event)?;
            }
        }

        if cancellation.is_some_and(CancellationToken::is_cancelled) {
            return Err(CodexApiError::Cancelled);
        }

        Ok(terminal)
    }

    pub async fn stream(
        &self,
        request: &CodexRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<StreamResult, CodexApiError> {
        let mut events = Vec::new();
        let terminal = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, terminal })
    }
}

fn validate_request_payload_shape(request: &CodexRequest) -> Result<(), CodexApiError> {
    if request.input.is_array() {
        return Ok(());
    }

    Err(CodexApiError::InvalidRequestPayload(format!(
        "'input' must be a JSON array/list, got {}",
        value_type_name(&request.input)
    )))
}

fn value_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn process_stream_event<F>(
    event: CodexStreamEvent,
    terminal: &mut Option<CodexResponseStatus>,
    on_event: &mut F,
) -> Result<(), CodexApiError>
where
    F: FnMut(CodexStreamEvent),
{
    if let Some(error) = stream_failure_from_event(&event) {
        return Err(error);
    }

    if let Some(next_terminal) = terminal_status_from_event(&event) {
        *terminal = Some(next_terminal);
    }

    on_event(event);
    Ok(())
}

#[cfg(test)]
fn terminal_status(events: &[CodexStreamEvent]) -> Option<CodexResponseStatus> {
    events.iter().filter_map(terminal_status_from_event).last()
}

fn terminal_status_from_event(event: &CodexStreamEvent) -> Option<CodexResponseStatus> {
    match event {
        CodexStreamEvent::ResponseCompleted { status, .. } => Some(*status),
        CodexStreamEvent::ResponseFailed { .. } | CodexStreamEvent::Error { .. } => {
            Some(CodexResponseStatus::Failed)
        }
        _ => None,
    }
}

fn stream_failure_from_event(event: &CodexStreamEvent) -> Option<CodexApiError> {
    match event {
        CodexStreamEvent::ResponseFailed { code, message } => Some(CodexApiError::StreamFailed {
            code: code.clone(),
            message: message
                .clone()
                .unwrap_or_else(|| "response failed".to_owned()),
        }),
        CodexStreamEvent::Error { code, message } => Some(CodexApiError::StreamFailed {
            code: code.clone(),
            message: message
                .clone()
                .or_else(|| code.clone())
                .unwrap_or_else(|| r#"{"type":"error"}"#.to_owned()),
        }),
        _ => None,
    }
}

fn clamp_reasoning_effort(model_id: &str, effort: &str) -> String {
    let id = model_id.rsplit('/').next().unwrap_or(model_id);
    if (id.starts_with("gpt-5.2") || id.starts_with("gpt-5.3")) && effort == "minimal" {
        return "low".to_owned();
    }
    if id == "gpt-5.1" && effort == "xhigh" {
        return "high".to_owned();
    }
    if id == "gpt-5.1-codex-mini" {
        return if matches!(effort, "high" | "xhigh") {
            "high".to_owned()
        } else {
            "medium".to_owned()
        };
    }
    effort.to_owned()
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationToken>,
) -> Result<F::Output, CodexApiError>
where
    F: Future,
{
    let Some(token) = cancellation else {
        return Ok(future.await);
    };

    if token.is_cancelled() {
        return Err(CodexApiError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CodexApiError::Cancelled),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_reasoning_effort, process_stream_event, terminal_status};
    use crate::error::CodexApiError;
    use crate::events::{CodexResponseStatus, CodexStreamEvent};
    use crate::sse::SseStreamParser;

    fn completed(status: CodexResponseStatus) -> CodexStreamEvent {
        CodexStreamEvent::ResponseCompleted {
            status,
            usage: None,
        }
    }

    #[test]
    fn terminal_status_reports_completed_status() {
        let events = vec![
            CodexStreamEvent::OutputTextDelta {
                delta: "hello".to_owned(),
            },
            completed(CodexResponseStatus::Completed),
        ];

        assert_eq!(
            terminal_status(&events),
            Some(CodexResponseStatus::Completed)
        );
    }

    #[test]
    fn terminal_status_reports_failed_status() {
        let events = vec![CodexStreamEvent::Error {
            code: Some("x".to_owned()),
            message: Some("bad".to_owned()),
        }];

        assert_eq!(terminal_status(&events), Some(CodexResponseStatus::Failed));
    }

    #[test]
    fn terminal_status_is_none_when_missing_terminal_event() {
        let events = vec![CodexStreamEvent::OutputTextDelta {
            delta: "hello".to_owned(),
        }];

        assert_eq!(terminal_status(&events), None);
    }

    #[test]
    fn process_stream_event_emits_output_deltas_in_parser_order() {
        let frames = concat!(
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"A\"}\n\n",
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"B\"}\n\n",
        );
        let mut parser = SseStreamParser::default();
        let parsed = parser.feed(frames.as_bytes());

        let mut terminal = None;
        let mut observed = Vec::new();
        for event in parsed {
            process_stream_event(event, &mut terminal, &mut |event| observed.push(event))
                .expect("output deltas should process successfully");
        }

        assert!(terminal.is_none());
        assert_eq!(
            observed,
            vec![
                CodexStreamEvent::OutputTextDelta {
                    delta: "A".to_string(),
                },
                CodexStreamEvent::OutputTextDelta {
                    delta: "B".to_string(),
                },
            ]
        );
    }

    #[test]
    fn process_stream_event_turns_failures_into_errors_with_codes() {
        let mut terminal = None;
        let error = process_stream_event(
            CodexStreamEvent::ResponseFailed {
                code: Some("server_error".to_owned()),
                message: Some("boom".to_owned()),
            },
            &mut terminal,
            &mut |_| panic!("failed events must not reach the handler"),
        )
        .expect_err("response.failed should abort the stream");

        assert!(matches!(
            &error,
            CodexApiError::StreamFailed { code: Some(code), message }
                if code == "server_error" && message == "boom"
        ));
        assert_eq!(error.code().as_deref(), Some("server_error"));
    }

    #[test]
    fn reasoning_effort_is_clamped_per_model() {
        assert_eq!(clamp_reasoning_effort("gpt-5.2-codex", "minimal"), "low");
        assert_eq!(clamp_reasoning_effort("gpt-5.1", "xhigh"), "high");
        assert_eq!(clamp_reasoning_effort("gpt-5.1-codex-mini", "low"), "medium");
        assert_eq!(clamp_reasoning_effort("openai/gpt-5.1-codex", "high"), "high");
    }
}
