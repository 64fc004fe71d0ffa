//! Built-in tools offered to the model on every request.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_provider::{CancelSignal, ToolDefinition};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::dispatch::{ToolOutcome, ToolResult};
use crate::plan::PlanStore;

mod fs;
mod grep;
mod plan;
mod shell;

pub(crate) use fs::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BuiltinTool {
    Shell,
    ReadFile,
    WriteFile,
    EditFile,
    Grep,
    UpdatePlan,
}

impl BuiltinTool {
    pub(crate) const ALL: [BuiltinTool; 6] = [
        Self::Shell,
        Self::ReadFile,
        Self::WriteFile,
        Self::EditFile,
        Self::Grep,
        Self::UpdatePlan,
    ];

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::EditFile => "edit_file",
            Self::Grep => "grep",
            Self::UpdatePlan => "update_plan",
        }
    }

    pub(crate) fn definition(&self) -> ToolDefinition {
        let (description, input_schema) = match self {
            Self::Shell => (
                "Runs a bash command in the working directory and returns its exit status and output.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"},
                        "timeout_sec": {"type": "integer", "minimum": 1},
                    },
                    "required": ["command"],
                }),
            ),
            Self::ReadFile => (
                "Reads a UTF-8 text file.",
                json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                }),
            ),
            Self::WriteFile => (
                "Creates or overwrites a file, creating parent directories.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"},
                    },
                    "required": ["path", "content"],
                }),
            ),
            Self::EditFile => (
                "Replaces the single occurrence of old_text with new_text in a file.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "old_text": {"type": "string"},
                        "new_text": {"type": "string"},
                    },
                    "required": ["path", "old_text", "new_text"],
                }),
            ),
            Self::Grep => (
                "Searches files under a directory for lines matching a regular expression.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"},
                        "path": {"type": "string"},
                        "case_insensitive": {"type": "boolean"},
                        "max_results": {"type": "integer", "minimum": 1},
                    },
                    "required": ["pattern"],
                }),
            ),
            Self::UpdatePlan => (
                "Replaces the task plan. Keep at most one step in_progress.",
                json!({
                    "type": "object",
                    "properties": {
                        "explanation": {"type": "string"},
                        "plan": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "step": {"type": "string"},
                                    "status": {
                                        "type": "string",
                                        "enum": ["pending", "in_progress", "completed"],
                                    },
                                },
                                "required": ["step", "status"],
                            },
                        },
                    },
                    "required": ["plan"],
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: Some(description.to_string()),
            input_schema,
        }
    }
}

/// Everything the built-ins need for one turn.
pub(crate) struct BuiltinTools {
    workspace: Workspace,
    shell_timeout: Duration,
    plan: Arc<PlanStore>,
    cancel: CancelSignal,
}

impl BuiltinTools {
    pub(crate) fn new(
        workspace: Workspace,
        shell_timeout: Duration,
        plan: Arc<PlanStore>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            workspace,
            shell_timeout,
            plan,
            cancel,
        }
    }

    pub(crate) fn working_directory(&self) -> &Path {
        self.workspace.root()
    }

    pub(crate) async fn execute(&self, tool: BuiltinTool, arguments: &Value) -> ToolOutcome {
        match tool {
            BuiltinTool::Shell => match parse_args::<shell::ShellArgs>(tool, arguments) {
                Ok(args) => {
                    shell::run(args, self.workspace.root(), self.shell_timeout, &self.cancel).await
                }
                Err(result) => result.into(),
            },
            BuiltinTool::ReadFile => match parse_args(tool, arguments) {
                Ok(args) => self.workspace.read_file(args).await.into(),
                Err(result) => result.into(),
            },
            BuiltinTool::WriteFile => match parse_args(tool, arguments) {
                Ok(args) => self.workspace.write_file(args).await.into(),
                Err(result) => result.into(),
            },
            BuiltinTool::EditFile => match parse_args(tool, arguments) {
                Ok(args) => self.workspace.edit_file(args).await.into(),
                Err(result) => result.into(),
            },
            BuiltinTool::Grep => match parse_args(tool, arguments) {
                Ok(args) => grep::search(&self.workspace, args, &self.cancel).await.into(),
                Err(result) => result.into(),
            },
            BuiltinTool::UpdatePlan => match parse_args(tool, arguments) {
                Ok(args) => plan::update(&self.plan, args).into(),
                Err(result) => result.into(),
            },
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: BuiltinTool, arguments: &Value) -> Result<T, ToolResult> {
    serde_json::from_value(arguments.clone()).map_err(|error| {
        ToolResult::error(format!("Invalid arguments for {}: {error}", tool.name()))
    })
}

/// Cuts `content` to at most `max_bytes` on a char boundary.
pub(crate) fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}
