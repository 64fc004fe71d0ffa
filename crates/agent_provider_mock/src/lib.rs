//! Deterministic mock implementation of the shared `agent_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing. Each run consumes the
//! next scripted [`MockResponse`]; once the script is exhausted the provider
//! echoes the latest user text.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agent_provider::{
    CancelSignal, MessageContent, ProviderProfile, RunEvent, RunMessage, RunProvider, RunRequest,
    ToolArguments, ToolCallRequest,
};
use async_trait::async_trait;
use serde_json::Value;
use thread_protocol::Usage;

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// One scripted action performed during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Streams text as whitespace-delimited deltas.
    Text(String),
    Reasoning(String),
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    /// A tool call whose argument text does not parse as a JSON object.
    MalformedToolCall {
        call_id: String,
        tool_name: String,
        raw: String,
    },
    WebSearch(String),
    Usage(Usage),
    Delay(Duration),
    /// Blocks until the run is cancelled.
    WaitForCancel,
    /// Ends the run with `RunEvent::Failed`.
    Fail {
        error: String,
        code: Option<String>,
    },
    /// Returns from `run` without emitting any terminal event.
    EndWithoutTerminal,
    /// Returns `Err` from `run` after `Started`.
    ProviderError(String),
}

/// Scripted outcome for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockResponse {
    pub steps: Vec<MockStep>,
}

impl MockResponse {
    #[must_use]
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockStep::Text(text.into())])
    }

    #[must_use]
    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::new(vec![MockStep::ToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }])
    }

    #[must_use]
    pub fn with_step(mut self, step: MockStep) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockResponse>,
    requests: Vec<RunRequest>,
}

/// Deterministic mock provider used by engine tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    model_id: String,
    token_delay: Duration,
    state: Mutex<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Creates an echo provider with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    /// Creates a provider that replays `responses` in order, one per run.
    #[must_use]
    pub fn scripted(responses: Vec<MockResponse>) -> Self {
        Self {
            model_id: "mock".to_string(),
            token_delay: Duration::ZERO,
            state: Mutex::new(MockState {
                script: responses.into(),
                requests: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    /// Sleeps between streamed text deltas.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub fn push_response(&self, response: MockResponse) {
        lock_unpoisoned(&self.state).script.push_back(response);
    }

    /// Every request received so far, in run order.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<RunRequest> {
        lock_unpoisoned(&self.state).requests.clone()
    }

    #[must_use]
    pub fn run_count(&self) -> usize {
        lock_unpoisoned(&self.state).requests.len()
    }

    fn next_response(&self, req: &RunRequest) -> MockResponse {
        let mut state = lock_unpoisoned(&self.state);
        state.requests.push(req.clone());
        state
            .script
            .pop_front()
            .unwrap_or_else(|| MockResponse::text(echo_reply(&req.messages)))
    }

    async fn stream_text(
        &self,
        run_id: u64,
        text: &str,
        cancel: &CancelSignal,
        emit: &mut (dyn FnMut(RunEvent) + Send),
    ) -> bool {
        let mut pending_token = String::new();
        for ch in text.chars() {
            pending_token.push(ch);

            if matches!(ch, ' ' | '\n') {
                if cancel.is_cancelled() {
                    return false;
                }
                emit(RunEvent::TextDelta {
                    run_id,
                    text: std::mem::take(&mut pending_token),
                });
                self.pause().await;
            }
        }

        if !pending_token.is_empty() {
            if cancel.is_cancelled() {
                return false;
            }
            emit(RunEvent::TextDelta {
                run_id,
                text: pending_token,
            });
            self.pause().await;
        }
        true
    }

    async fn pause(&self) {
        if !self.token_delay.is_zero() {
            tokio::time::sleep(self.token_delay).await;
        }
    }
}

#[async_trait]
impl RunProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    async fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut (dyn FnMut(RunEvent) + Send),
    ) -> Result<(), String> {
        let run_id = req.run_id;
        let response = self.next_response(&req);
        let mut usage = None;

        emit(RunEvent::Started { run_id });

        for step in response.steps {
            if cancel.is_cancelled() {
                emit(RunEvent::Cancelled { run_id });
                return Ok(());
            }

            match step {
                MockStep::Text(text) => {
                    if !self.stream_text(run_id, &text, &cancel, emit).await {
                        emit(RunEvent::Cancelled { run_id });
                        return Ok(());
                    }
                }
                MockStep::Reasoning(text) => emit(RunEvent::ReasoningDelta { run_id, text }),
                MockStep::ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                } => emit(RunEvent::ToolCall {
                    run_id,
                    call: ToolCallRequest {
                        call_id,
                        tool_name,
                        arguments: ToolArguments::Parsed(arguments),
                    },
                }),
                MockStep::MalformedToolCall {
                    call_id,
                    tool_name,
                    raw,
                } => emit(RunEvent::ToolCall {
                    run_id,
                    call: ToolCallRequest {
                        call_id,
                        tool_name,
                        arguments: ToolArguments::from_raw(&raw),
                    },
                }),
                MockStep::WebSearch(query) => emit(RunEvent::WebSearch { run_id, query }),
                MockStep::Usage(value) => usage = Some(value),
                MockStep::Delay(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                MockStep::WaitForCancel => cancel.cancelled().await,
                MockStep::Fail { error, code } => {
                    emit(RunEvent::Failed {
                        run_id,
                        error,
                        code,
                    });
                    return Ok(());
                }
                MockStep::EndWithoutTerminal => return Ok(()),
                MockStep::ProviderError(message) => return Err(message),
            }
        }

        if cancel.is_cancelled() {
            emit(RunEvent::Cancelled { run_id });
        } else {
            emit(RunEvent::Finished { run_id, usage });
        }

        Ok(())
    }
}

fn echo_reply(messages: &[RunMessage]) -> String {
    let latest = messages.iter().rev().find_map(|message| match message {
        RunMessage::UserInput { content } => Some(
            content
                .iter()
                .filter_map(|part| match part {
                    MessageContent::Text { text } => Some(text.as_str()),
                    MessageContent::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    });

    match latest {
        Some(text) if !text.trim().is_empty() => format!("Echo: {text}"),
        _ => "Echo: (no input)".to_string(),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
