//! One turn: the request/tool loop between a user input and its terminal event.
//!
//! The executor owns every event the turn emits. History and the rollout are
//! written only when the turn succeeds, right before `turn.completed`; a failed
//! turn leaves the thread exactly as it was apart from tool side effects.

use std::mem;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};

use agent_provider::{
    CancelSignal, RunEvent, RunId, RunMessage, RunRequest, ToolArguments, ToolCallRequest,
};
use futures::FutureExt;
use serde_json::Value;
use session_store::SessionEntryKind;
use thread_protocol::{
    CommandExecutionStatus, FileChangeKind, FileUpdateChange, PatchApplyStatus, StepStatus,
    ThreadError, ThreadEvent, ThreadItem, ThreadItemDetails, ToolCallStatus, Usage,
};

use crate::dispatch::{panic_message, ToolDispatcher, ToolInvocation, ToolOutcome, ToolResult};
use crate::input::PreparedInput;
use crate::lock_unpoisoned;
use crate::plan::Plan;
use crate::stream::{EventSink, TerminalGuard};
use crate::thread::{ThreadShared, TurnSlot};
use crate::tools::BuiltinTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnState {
    Idle,
    Sent,
    Streaming,
    ToolPending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TurnFailure {
    message: String,
    code: String,
}

impl TurnFailure {
    fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new("Turn cancelled", "cancelled")
    }
}

/// Everything produced during the turn that is committed on success.
#[derive(Debug, Default)]
struct TurnJournal {
    entries: Vec<SessionEntryKind>,
    messages: Vec<RunMessage>,
    items: Vec<ThreadItem>,
}

impl TurnJournal {
    fn message(&mut self, message: RunMessage) {
        self.entries.push(SessionEntryKind::from(message.clone()));
        self.messages.push(message);
    }

    fn item(&mut self, item: ThreadItem) {
        self.entries.push(SessionEntryKind::Item { item: item.clone() });
        self.items.push(item);
    }
}

pub(crate) struct TurnSetup {
    pub(crate) thread: Arc<ThreadShared>,
    pub(crate) slot: TurnSlot,
    pub(crate) thread_id: String,
    pub(crate) sink: EventSink,
    pub(crate) cancel: CancelSignal,
    pub(crate) notes: Arc<Mutex<Vec<String>>>,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) history: Vec<RunMessage>,
    pub(crate) next_item: u64,
    pub(crate) plan_version_seen: u64,
    pub(crate) output_schema: Option<Value>,
}

pub(crate) struct TurnExecutor {
    thread: Arc<ThreadShared>,
    slot: Option<TurnSlot>,
    thread_id: String,
    sink: EventSink,
    cancel: CancelSignal,
    notes: Arc<Mutex<Vec<String>>>,
    dispatcher: ToolDispatcher,
    history: Vec<RunMessage>,
    output_schema: Option<Value>,
    journal: TurnJournal,
    next_item: u64,
    usage: Usage,
    plan_version_seen: u64,
    plan_changed_by_model: bool,
    state: TurnState,
}

impl TurnExecutor {
    pub(crate) fn new(setup: TurnSetup) -> Self {
        Self {
            thread: setup.thread,
            slot: Some(setup.slot),
            thread_id: setup.thread_id,
            sink: setup.sink,
            cancel: setup.cancel,
            notes: setup.notes,
            dispatcher: setup.dispatcher,
            history: setup.history,
            output_schema: setup.output_schema,
            journal: TurnJournal::default(),
            next_item: setup.next_item,
            usage: Usage::default(),
            plan_version_seen: setup.plan_version_seen,
            plan_changed_by_model: false,
            state: TurnState::Idle,
        }
    }

    pub(crate) async fn run(mut self, input: PreparedInput) {
        let _terminal = TerminalGuard::new(self.sink.clone());
        self.sink.send(ThreadEvent::TurnStarted);
        tracing::debug!(thread_id = %self.thread_id, "turn started");

        let outcome = match self.drive(input).await {
            Ok(()) => {
                self.close_background_events();
                self.commit()
            }
            Err(failure) => Err(failure),
        };

        let terminal = match outcome {
            Ok(()) => {
                self.transition(TurnState::Completed);
                tracing::info!(thread_id = %self.thread_id, usage = ?self.usage, "turn completed");
                ThreadEvent::TurnCompleted { usage: self.usage }
            }
            Err(failure) => {
                self.transition(TurnState::Failed);
                tracing::warn!(
                    thread_id = %self.thread_id,
                    code = %failure.code,
                    message = %failure.message,
                    "turn failed"
                );
                self.mark_uncommitted_plan();
                ThreadEvent::TurnFailed {
                    error: ThreadError::with_code(failure.message, failure.code),
                }
            }
        };

        lock_unpoisoned(&self.thread.state).next_item = self.next_item;
        // The thread accepts a new turn before the caller sees this one end.
        drop(self.slot.take());
        self.sink.send(terminal);
    }

    async fn drive(&mut self, input: PreparedInput) -> Result<(), TurnFailure> {
        self.record_user_input(input);
        self.announce_plan_change();

        let max_rounds = self.thread.codex.options.max_tool_rounds;
        let mut rounds = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(TurnFailure::cancelled());
            }
            if rounds == max_rounds {
                return Err(TurnFailure::new(
                    format!("Turn stopped after {max_rounds} model requests without a final answer"),
                    "max_tool_rounds",
                ));
            }
            rounds += 1;

            self.drain_notes();
            let calls = self.request_round().await?;
            if calls.is_empty() {
                return Ok(());
            }

            self.transition(TurnState::ToolPending);
            for call in calls {
                self.run_tool_call(call).await?;
            }
        }
    }

    fn transition(&mut self, next: TurnState) {
        tracing::debug!(thread_id = %self.thread_id, from = ?self.state, to = ?next, "turn state");
        self.state = next;
    }

    fn new_item(&mut self, details: ThreadItemDetails) -> ThreadItem {
        let item = ThreadItem::new(format!("item_{}", self.next_item), details);
        self.next_item += 1;
        item
    }

    /// Emits a started/completed pair for an item with no intermediate state.
    fn emit_instant(&mut self, details: ThreadItemDetails) {
        let item = self.new_item(details);
        self.sink.send(ThreadEvent::ItemStarted { item: item.clone() });
        self.sink.send(ThreadEvent::ItemCompleted { item: item.clone() });
        self.journal.item(item);
    }

    fn record_user_input(&mut self, input: PreparedInput) {
        self.journal.message(RunMessage::UserInput {
            content: input.content,
        });
        // History only; never streamed.
        let item = self.new_item(ThreadItemDetails::UserMessage {
            text: input.text,
            images: input.images,
        });
        self.journal.item(item);
    }

    /// Shows the model a plan that changed since it last saw one.
    fn announce_plan_change(&mut self) {
        let version = self.thread.plan.version();
        if version == self.plan_version_seen {
            return;
        }

        let plan = self.thread.plan.snapshot();
        self.emit_instant(ThreadItemDetails::TodoList {
            items: plan.steps.clone(),
        });
        self.journal.message(RunMessage::Note {
            text: plan_note(&plan),
        });
        self.plan_version_seen = version;
    }

    fn drain_notes(&mut self) {
        let notes = mem::take(&mut *lock_unpoisoned(&self.notes));
        for text in notes {
            self.journal.message(RunMessage::Note { text });
        }
    }

    /// Stops routing background events here and keeps the ones that arrived
    /// during the last request, so they reach the model on the next turn.
    fn close_background_events(&mut self) {
        if let Some(slot) = self.slot.as_mut() {
            slot.unregister();
        }
        self.drain_notes();
    }

    fn build_request(&self, run_id: RunId) -> RunRequest {
        let codex = &self.thread.codex;
        let options = &self.thread.options;
        let mut messages = self.history.clone();
        messages.extend(self.journal.messages.iter().cloned());

        let mut request = RunRequest::new(run_id, codex.options.base_instructions.clone(), messages);
        request.model = options.model.clone();
        request.tools = self.dispatcher.definitions();
        request.reasoning_effort = options
            .reasoning_effort
            .map(|effort| effort.as_str().to_string());
        request.output_schema = self.output_schema.clone();
        request.prompt_cache_key = Some(self.thread_id.clone());
        request
    }

    /// One backend request. Returns the tool calls the model asked for.
    async fn request_round(&mut self) -> Result<Vec<ToolCallRequest>, TurnFailure> {
        let run_id = self.thread.codex.next_run_id();
        let request = self.build_request(run_id);
        let provider = Arc::clone(&self.thread.codex.provider);
        self.transition(TurnState::Sent);

        let mut round = RoundAccumulator::new(run_id, self.sink.clone(), self.next_item);
        let result = {
            let mut emit = |event: RunEvent| round.observe(event);
            AssertUnwindSafe(provider.run(request, self.cancel.clone(), &mut emit))
                .catch_unwind()
                .await
        };

        let output = round.finish();
        if output.streamed {
            self.transition(TurnState::Streaming);
        }
        self.next_item = output.next_item;
        for item in output.items {
            self.journal.item(item);
        }
        if !output.assistant_text.is_empty() {
            self.journal.message(RunMessage::AssistantText {
                text: output.assistant_text,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(TurnFailure::cancelled());
        }
        match result {
            Err(panic) => Err(TurnFailure::new(
                format!("Provider panicked: {}", panic_message(panic.as_ref())),
                "provider_error",
            )),
            Ok(Err(error)) => Err(TurnFailure::new(error, "provider_error")),
            Ok(Ok(())) => match output.terminal {
                Some(RoundTerminal::Finished(usage)) => {
                    if let Some(usage) = usage {
                        self.usage.accumulate(&usage);
                    }
                    Ok(output.tool_calls)
                }
                Some(RoundTerminal::Failed { error, code }) => Err(TurnFailure::new(
                    error,
                    code.unwrap_or_else(|| "provider_error".to_string()),
                )),
                Some(RoundTerminal::Cancelled) => Err(TurnFailure::cancelled()),
                None => Err(TurnFailure::new(
                    "Provider ended the request without a terminal event",
                    "provider_error",
                )),
            },
        }
    }

    async fn run_tool_call(&mut self, call: ToolCallRequest) -> Result<(), TurnFailure> {
        let ToolCallRequest {
            call_id,
            tool_name,
            arguments,
        } = call;
        self.journal.message(RunMessage::ToolCall {
            call_id: call_id.clone(),
            tool_name: tool_name.clone(),
            arguments: arguments.to_value(),
        });

        let arguments = match arguments {
            ToolArguments::Parsed(value) => value,
            ToolArguments::Malformed { error, .. } => {
                let message = format!("Invalid arguments for tool `{tool_name}`: {error}");
                self.emit_instant(ThreadItemDetails::Error {
                    message: message.clone(),
                });
                self.journal.message(RunMessage::ToolResult {
                    call_id,
                    tool_name,
                    content: message,
                    is_error: true,
                });
                return Ok(());
            }
        };

        let builtin = self.dispatcher.builtin_for(&tool_name);
        let started = self.started_tool_item(builtin, &tool_name, &arguments);
        if let Some(item) = &started {
            self.sink.send(ThreadEvent::ItemStarted { item: item.clone() });
        }

        let invocation = ToolInvocation {
            tool_name: tool_name.clone(),
            call_id: call_id.clone(),
            arguments,
        };
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = self.dispatcher.dispatch(invocation) => Some(outcome),
        };
        let Some(outcome) = outcome else {
            if let Some(item) = started {
                let cancelled = ToolOutcome::from(ToolResult::error("Tool call cancelled"));
                self.sink.send(ThreadEvent::ItemCompleted {
                    item: completed_tool_item(item, &cancelled),
                });
            }
            return Err(TurnFailure::cancelled());
        };

        match started {
            Some(item) => {
                let item = completed_tool_item(item, &outcome);
                self.sink.send(ThreadEvent::ItemCompleted { item: item.clone() });
                self.journal.item(item);
            }
            None if outcome.result.success => {
                self.plan_version_seen = self.thread.plan.version();
                self.plan_changed_by_model = true;
                let steps = self.thread.plan.snapshot().steps.clone();
                self.emit_instant(ThreadItemDetails::TodoList { items: steps });
            }
            None => self.emit_instant(ThreadItemDetails::Error {
                message: outcome.result.model_text(),
            }),
        }

        tracing::debug!(
            tool = %tool_name,
            success = outcome.result.success,
            declined = outcome.declined,
            "tool call finished"
        );
        self.journal.message(RunMessage::ToolResult {
            call_id,
            tool_name,
            content: outcome.result.model_text(),
            is_error: !outcome.result.success,
        });
        Ok(())
    }

    /// The in-progress item for a call, or `None` for the built-in plan tool,
    /// whose item is only known once it ran.
    fn started_tool_item(
        &mut self,
        builtin: Option<BuiltinTool>,
        tool_name: &str,
        arguments: &Value,
    ) -> Option<ThreadItem> {
        let details = match builtin {
            Some(BuiltinTool::UpdatePlan) => return None,
            Some(BuiltinTool::Shell) => ThreadItemDetails::CommandExecution {
                command: string_arg(arguments, "command"),
                aggregated_output: String::new(),
                exit_code: None,
                status: CommandExecutionStatus::InProgress,
            },
            Some(tool @ (BuiltinTool::WriteFile | BuiltinTool::EditFile)) => {
                let path = string_arg(arguments, "path");
                let exists = resolve_against(self.dispatcher.working_directory(), &path).exists();
                let kind = if tool == BuiltinTool::WriteFile && !exists {
                    FileChangeKind::Add
                } else {
                    FileChangeKind::Update
                };
                ThreadItemDetails::FileChange {
                    changes: vec![FileUpdateChange { path, kind }],
                    status: PatchApplyStatus::InProgress,
                }
            }
            _ => ThreadItemDetails::ToolCall {
                tool: tool_name.to_string(),
                arguments: arguments.clone(),
                output: None,
                error: None,
                status: ToolCallStatus::InProgress,
            },
        };
        Some(self.new_item(details))
    }

    fn commit(&mut self) -> Result<(), TurnFailure> {
        let journal = mem::take(&mut self.journal);
        let mut state = lock_unpoisoned(&self.thread.state);

        let mut entries = journal.entries;
        if self.plan_changed_by_model || state.plan_dirty {
            let plan = self.thread.plan.snapshot();
            entries.push(SessionEntryKind::Plan {
                explanation: plan.explanation.clone(),
                steps: plan.steps.clone(),
            });
        }

        let Some(store) = state.store.as_mut() else {
            return Err(TurnFailure::new("Thread has no rollout", "internal"));
        };
        store.append_kinds(entries).map_err(|error| {
            TurnFailure::new(format!("Failed to persist turn: {error}"), "persistence")
        })?;

        state.plan_dirty = false;
        state.messages.extend(journal.messages);
        state.items.extend(journal.items);
        state.plan_version_seen = self.plan_version_seen;
        Ok(())
    }

    fn mark_uncommitted_plan(&self) {
        if self.plan_changed_by_model {
            lock_unpoisoned(&self.thread.state).plan_dirty = true;
        }
    }
}

fn completed_tool_item(item: ThreadItem, outcome: &ToolOutcome) -> ThreadItem {
    let success = outcome.result.success;
    let details = match item.details {
        ThreadItemDetails::CommandExecution { command, .. } => {
            ThreadItemDetails::CommandExecution {
                command,
                aggregated_output: outcome.result.model_text(),
                exit_code: outcome.exit_code,
                status: if outcome.declined {
                    CommandExecutionStatus::Declined
                } else if success {
                    CommandExecutionStatus::Completed
                } else {
                    CommandExecutionStatus::Failed
                },
            }
        }
        ThreadItemDetails::FileChange { changes, .. } => ThreadItemDetails::FileChange {
            changes,
            status: if success {
                PatchApplyStatus::Completed
            } else {
                PatchApplyStatus::Failed
            },
        },
        ThreadItemDetails::ToolCall {
            tool, arguments, ..
        } => ThreadItemDetails::ToolCall {
            tool,
            arguments,
            output: outcome.result.output.clone(),
            error: outcome.result.error.clone(),
            status: if success {
                ToolCallStatus::Completed
            } else {
                ToolCallStatus::Failed
            },
        },
        other => other,
    };
    ThreadItem::new(item.id, details)
}

fn string_arg(arguments: &Value, key: &str) -> String {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn resolve_against(root: &Path, path: &str) -> std::path::PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn plan_note(plan: &Plan) -> String {
    let mut note = String::from("The task plan was updated.");
    if let Some(explanation) = &plan.explanation {
        note.push('\n');
        note.push_str(explanation);
    }
    if plan.steps.is_empty() {
        note.push_str("\n(no steps)");
    }
    for (index, step) in plan.steps.iter().enumerate() {
        let marker = match step.status {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
        };
        note.push_str(&format!("\n{}. [{marker}] {}", index + 1, step.step));
    }
    note
}

#[derive(Debug, Clone, PartialEq)]
enum RoundTerminal {
    Finished(Option<Usage>),
    Failed { error: String, code: Option<String> },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamedKind {
    Message,
    Reasoning,
}

#[derive(Debug)]
struct OpenItem {
    kind: StreamedKind,
    id: String,
    text: String,
}

impl OpenItem {
    fn to_item(&self) -> ThreadItem {
        let details = match self.kind {
            StreamedKind::Message => ThreadItemDetails::AgentMessage {
                text: self.text.clone(),
            },
            StreamedKind::Reasoning => ThreadItemDetails::Reasoning {
                text: self.text.clone(),
            },
        };
        ThreadItem::new(self.id.clone(), details)
    }
}

struct RoundOutput {
    next_item: u64,
    streamed: bool,
    items: Vec<ThreadItem>,
    assistant_text: String,
    tool_calls: Vec<ToolCallRequest>,
    terminal: Option<RoundTerminal>,
}

/// Folds one request's provider events into stream events and items.
struct RoundAccumulator {
    run_id: RunId,
    sink: EventSink,
    next_item: u64,
    streamed: bool,
    open: Vec<OpenItem>,
    items: Vec<ThreadItem>,
    tool_calls: Vec<ToolCallRequest>,
    terminal: Option<RoundTerminal>,
}

impl RoundAccumulator {
    fn new(run_id: RunId, sink: EventSink, next_item: u64) -> Self {
        Self {
            run_id,
            sink,
            next_item,
            streamed: false,
            open: Vec::new(),
            items: Vec::new(),
            tool_calls: Vec::new(),
            terminal: None,
        }
    }

    fn allocate_id(&mut self) -> String {
        let id = format!("item_{}", self.next_item);
        self.next_item += 1;
        id
    }

    fn observe(&mut self, event: RunEvent) {
        if event.run_id() != self.run_id {
            tracing::debug!(expected = self.run_id, got = event.run_id(), "ignoring event from another run");
            return;
        }
        if self.terminal.is_some() {
            tracing::debug!(?event, "ignoring event after run terminal");
            return;
        }

        match event {
            RunEvent::Started { .. } => self.streamed = true,
            RunEvent::TextDelta { text, .. } => self.append(StreamedKind::Message, &text),
            RunEvent::ReasoningDelta { text, .. } => self.append(StreamedKind::Reasoning, &text),
            RunEvent::ToolCall { call, .. } => self.tool_calls.push(call),
            RunEvent::WebSearch { query, .. } => {
                let item = ThreadItem::new(self.allocate_id(), ThreadItemDetails::WebSearch { query });
                self.sink.send(ThreadEvent::ItemStarted { item: item.clone() });
                self.sink.send(ThreadEvent::ItemCompleted { item: item.clone() });
                self.items.push(item);
            }
            RunEvent::Finished { usage, .. } => self.terminal = Some(RoundTerminal::Finished(usage)),
            RunEvent::Failed { error, code, .. } => {
                self.terminal = Some(RoundTerminal::Failed { error, code });
            }
            RunEvent::Cancelled { .. } => self.terminal = Some(RoundTerminal::Cancelled),
        }
    }

    fn append(&mut self, kind: StreamedKind, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.streamed = true;

        if let Some(open) = self.open.iter_mut().find(|open| open.kind == kind) {
            open.text.push_str(delta);
            let item = open.to_item();
            self.sink.send(ThreadEvent::ItemUpdated { item });
            return;
        }

        let open = OpenItem {
            kind,
            id: self.allocate_id(),
            text: delta.to_string(),
        };
        self.sink.send(ThreadEvent::ItemStarted {
            item: open.to_item(),
        });
        self.open.push(open);
    }

    /// Completes every streamed item in the order it started.
    fn finish(mut self) -> RoundOutput {
        let mut assistant_text = String::new();
        for open in mem::take(&mut self.open) {
            let item = open.to_item();
            self.sink.send(ThreadEvent::ItemCompleted { item: item.clone() });
            if open.kind == StreamedKind::Message {
                assistant_text = open.text;
            }
            self.items.push(item);
        }

        RoundOutput {
            next_item: self.next_item,
            streamed: self.streamed,
            items: self.items,
            assistant_text,
            tool_calls: self.tool_calls,
            terminal: self.terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use thread_protocol::PlanStep;

    use super::*;
    use crate::stream::event_channel;

    #[tokio::test]
    async fn deltas_become_started_updated_completed() {
        let (sink, mut stream) = event_channel();
        let mut round = RoundAccumulator::new(7, sink, 3);

        round.observe(RunEvent::Started { run_id: 7 });
        round.observe(RunEvent::TextDelta {
            run_id: 7,
            text: "Hel".to_string(),
        });
        round.observe(RunEvent::TextDelta {
            run_id: 7,
            text: "lo".to_string(),
        });
        round.observe(RunEvent::TextDelta {
            run_id: 8,
            text: "stray".to_string(),
        });
        round.observe(RunEvent::Finished {
            run_id: 7,
            usage: None,
        });
        round.observe(RunEvent::TextDelta {
            run_id: 7,
            text: "late".to_string(),
        });
        let output = round.finish();

        assert_eq!(output.assistant_text, "Hello");
        assert_eq!(output.next_item, 4);
        assert_eq!(output.terminal, Some(RoundTerminal::Finished(None)));

        let message = |text: &str| {
            ThreadItem::new(
                "item_3",
                ThreadItemDetails::AgentMessage {
                    text: text.to_string(),
                },
            )
        };
        assert_eq!(
            stream.next().await,
            Some(ThreadEvent::ItemStarted { item: message("Hel") })
        );
        assert_eq!(
            stream.next().await,
            Some(ThreadEvent::ItemUpdated {
                item: message("Hello")
            })
        );
        assert_eq!(
            stream.next().await,
            Some(ThreadEvent::ItemCompleted {
                item: message("Hello")
            })
        );
    }

    #[test]
    fn completed_items_carry_the_outcome() {
        let started = ThreadItem::new(
            "item_1",
            ThreadItemDetails::CommandExecution {
                command: "ls".to_string(),
                aggregated_output: String::new(),
                exit_code: None,
                status: CommandExecutionStatus::InProgress,
            },
        );
        let declined = ToolOutcome {
            result: ToolResult::error("Approval denied for tool `shell`"),
            exit_code: None,
            declined: true,
        };

        let item = completed_tool_item(started, &declined);
        assert_eq!(
            item.details,
            ThreadItemDetails::CommandExecution {
                command: "ls".to_string(),
                aggregated_output: "Approval denied for tool `shell`".to_string(),
                exit_code: None,
                status: CommandExecutionStatus::Declined,
            }
        );
    }

    #[test]
    fn plan_notes_list_steps_with_status() {
        let plan = Plan {
            explanation: Some("ship it".to_string()),
            steps: vec![
                PlanStep::new("write", StepStatus::Completed),
                PlanStep::new("test", StepStatus::InProgress),
            ],
        };

        assert_eq!(
            plan_note(&plan),
            "The task plan was updated.\nship it\n1. [completed] write\n2. [in_progress] test"
        );
    }
}
