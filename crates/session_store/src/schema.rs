use agent_provider::{MessageContent, RunMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thread_protocol::{PlanStep, ThreadItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRecordType {
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRecordType {
    Entry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionHeader {
    #[serde(rename = "type")]
    pub record_type: SessionRecordType,
    pub version: u32,
    pub session_id: String,
    pub created_at: String,
    pub cwd: String,
    /// Source session id when this rollout was produced by a fork.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<String>,
}

impl SessionHeader {
    #[must_use]
    pub fn v1(
        session_id: impl Into<String>,
        created_at: impl Into<String>,
        cwd: impl Into<String>,
    ) -> Self {
        Self {
            record_type: SessionRecordType::Session,
            version: 1,
            session_id: session_id.into(),
            created_at: created_at.into(),
            cwd: cwd.into(),
            forked_from: None,
        }
    }

    #[must_use]
    pub fn with_forked_from(mut self, source: impl Into<String>) -> Self {
        self.forked_from = Some(source.into());
        self
    }
}

/// One rollout entry. Lines are parsed by the store, which splits the envelope
/// from the strictly checked [`SessionEntryKind`] payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEntry {
    #[serde(rename = "type")]
    pub record_type: EntryRecordType,
    pub id: String,
    pub parent_id: Option<String>,
    pub ts: String,
    #[serde(flatten)]
    pub kind: SessionEntryKind,
}

impl SessionEntry {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        parent_id: Option<impl Into<String>>,
        ts: impl Into<String>,
        kind: SessionEntryKind,
    ) -> Self {
        Self {
            record_type: EntryRecordType::Entry,
            id: id.into(),
            parent_id: parent_id.map(Into::into),
            ts: ts.into(),
            kind,
        }
    }
}

/// Payload of one rollout entry.
///
/// Conversation kinds map one-to-one onto [`RunMessage`]; `item` and `plan`
/// records carry caller-visible state that the model never sees directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SessionEntryKind {
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
    Note {
        text: String,
    },
    Item {
        item: ThreadItem,
    },
    Plan {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
        steps: Vec<PlanStep>,
    },
}

impl SessionEntryKind {
    /// Returns the model-facing message for conversation kinds.
    #[must_use]
    pub fn to_run_message(&self) -> Option<RunMessage> {
        Some(match self {
            Self::UserInput { content } => RunMessage::UserInput {
                content: content.clone(),
            },
            Self::AssistantText { text } => RunMessage::AssistantText { text: text.clone() },
            Self::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => RunMessage::ToolCall {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                arguments: arguments.clone(),
            },
            Self::ToolResult {
                call_id,
                tool_name,
                content,
                is_error,
            } => RunMessage::ToolResult {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
            Self::Note { text } => RunMessage::Note { text: text.clone() },
            Self::Item { .. } | Self::Plan { .. } => return None,
        })
    }

    #[must_use]
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::UserInput { .. })
    }
}

impl From<RunMessage> for SessionEntryKind {
    fn from(message: RunMessage) -> Self {
        match message {
            RunMessage::UserInput { content } => Self::UserInput { content },
            RunMessage::AssistantText { text } => Self::AssistantText { text },
            RunMessage::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => Self::ToolCall {
                call_id,
                tool_name,
                arguments,
            },
            RunMessage::ToolResult {
                call_id,
                tool_name,
                content,
                is_error,
            } => Self::ToolResult {
                call_id,
                tool_name,
                content,
                is_error,
            },
            RunMessage::Note { text } => Self::Note { text },
        }
    }
}

/// Envelope fields every entry line carries next to its kind payload.
pub(crate) const ENTRY_ENVELOPE_FIELDS: [&str; 4] = ["type", "id", "parent_id", "ts"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JsonLine {
    Session(SessionHeader),
    Entry(SessionEntry),
}
