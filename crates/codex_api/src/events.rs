use serde::{Deserialize, Serialize};

/// Canonical terminal state mapped from Responses payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodexResponseStatus {
    Completed,
    Incomplete,
    Failed,
    Cancelled,
    Queued,
    InProgress,
}

impl CodexResponseStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
        }
    }
}

/// Token usage reported with `response.completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexUsage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
}

/// Stream event emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CodexStreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta { delta: String },
    /// Completed assistant message item with its full text.
    #[serde(rename = "response.output_item.message")]
    MessageDone { id: Option<String>, text: String },
    /// Function-tool call extracted from an output item. `arguments` is the
    /// raw JSON text exactly as the model produced it.
    #[serde(rename = "response.output_item.function_call")]
    ToolCallRequested {
        id: Option<String>,
        call_id: Option<String>,
        tool_name: Option<String>,
        arguments: Option<String>,
    },
    #[serde(rename = "response.output_item.web_search_call")]
    WebSearchCall {
        id: Option<String>,
        query: Option<String>,
    },
    /// Any other finished output item (reasoning, custom items).
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        id: Option<String>,
        status: Option<CodexResponseStatus>,
    },
    #[serde(rename = "response.completed")]
    ResponseCompleted {
        status: CodexResponseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<CodexUsage>,
    },
    #[serde(rename = "response.failed")]
    ResponseFailed {
        code: Option<String>,
        message: Option<String>,
    },
    #[serde(rename = "error")]
    Error {
        code: Option<String>,
        message: Option<String>,
    },
}
