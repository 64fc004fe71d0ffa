use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::PlanStep;

/// A typed unit of thread history with an id stable for the whole thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadItem {
    pub id: String,
    #[serde(flatten)]
    pub details: ThreadItemDetails,
}

impl ThreadItem {
    #[must_use]
    pub fn new(id: impl Into<String>, details: ThreadItemDetails) -> Self {
        Self {
            id: id.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadItemDetails {
    AgentMessage {
        text: String,
    },
    Reasoning {
        text: String,
    },
    CommandExecution {
        command: String,
        aggregated_output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        status: CommandExecutionStatus,
    },
    FileChange {
        changes: Vec<FileUpdateChange>,
        status: PatchApplyStatus,
    },
    McpToolCall {
        server: String,
        tool: String,
        status: McpToolCallStatus,
    },
    /// Any other function tool, built-in or caller-registered.
    ToolCall {
        tool: String,
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        status: ToolCallStatus,
    },
    WebSearch {
        query: String,
    },
    TodoList {
        items: Vec<PlanStep>,
    },
    Error {
        message: String,
    },
    /// History-only record of what the caller sent.
    UserMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        images: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandExecutionStatus {
    InProgress,
    Completed,
    Failed,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchApplyStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpToolCallStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdateChange {
    pub path: String,
    pub kind: FileChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Add,
    Delete,
    Update,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::plan::StepStatus;

    #[test]
    fn item_type_tag_sits_beside_id() {
        let item = ThreadItem::new(
            "item_3",
            ThreadItemDetails::AgentMessage {
                text: "done".to_string(),
            },
        );

        assert_eq!(
            serde_json::to_value(&item).expect("item should serialize"),
            json!({"id": "item_3", "type": "agent_message", "text": "done"})
        );
    }

    #[test]
    fn command_execution_parses_without_exit_code() {
        let item: ThreadItem = serde_json::from_value(json!({
            "id": "item_0",
            "type": "command_execution",
            "command": "ls",
            "aggregated_output": "",
            "status": "in_progress",
        }))
        .expect("in-progress command should parse");

        assert_eq!(
            item.details,
            ThreadItemDetails::CommandExecution {
                command: "ls".to_string(),
                aggregated_output: String::new(),
                exit_code: None,
                status: CommandExecutionStatus::InProgress,
            }
        );
    }

    #[test]
    fn todo_list_embeds_plan_steps() {
        let item = ThreadItem::new(
            "item_1",
            ThreadItemDetails::TodoList {
                items: vec![PlanStep::new("write tests", StepStatus::InProgress)],
            },
        );

        assert_eq!(
            serde_json::to_value(&item).expect("todo list should serialize"),
            json!({
                "id": "item_1",
                "type": "todo_list",
                "items": [{"step": "write tests", "status": "in_progress"}],
            })
        );
    }
}
