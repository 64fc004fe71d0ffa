use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agent_provider::RunMessage;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use session_store::{SessionEntryKind, SessionStore};
use thread_protocol::{
    PlanOperation, PlanStep, ThreadEvent, ThreadItem, ThreadItemDetails, Usage,
};

use crate::approval::{ApprovalGate, ApprovalHandler};
use crate::codex::{ActiveTurn, CodexInner};
use crate::config::{ThreadOptions, TurnOptions};
use crate::dispatch::ToolDispatcher;
use crate::error::CodexError;
use crate::input::{prepare_input, Input};
use crate::lock_unpoisoned;
use crate::plan::{Plan, PlanStore};
use crate::stream::{event_channel, EventStream};
use crate::tools::{BuiltinTools, Workspace};
use crate::turn::{TurnExecutor, TurnSetup};

const UNTRUSTED_DIRECTORY_MESSAGE: &str =
    "Not inside a trusted directory and --skip-git-repo-check was not specified.";

/// Collected outcome of a completed turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Items completed during the turn, in completion order.
    pub items: Vec<ThreadItem>,
    /// Text of the last agent message, empty if the model never answered in text.
    pub final_response: String,
    pub usage: Usage,
}

/// Committed conversation state of a thread.
pub(crate) struct ThreadState {
    pub(crate) messages: Vec<RunMessage>,
    pub(crate) items: Vec<ThreadItem>,
    pub(crate) next_item: u64,
    /// Present once the first turn started, or from the start for resumed threads.
    pub(crate) store: Option<SessionStore>,
    /// Plan version the model last saw.
    pub(crate) plan_version_seen: u64,
    /// The plan changed while nothing was written to the rollout.
    pub(crate) plan_dirty: bool,
}

impl ThreadState {
    pub(crate) fn thread_id(&self) -> Option<&str> {
        self.store.as_ref().map(SessionStore::session_id)
    }
}

pub(crate) struct ThreadShared {
    pub(crate) codex: Arc<CodexInner>,
    pub(crate) options: ThreadOptions,
    pub(crate) state: Mutex<ThreadState>,
    pub(crate) plan: Arc<PlanStore>,
    turn_active: AtomicBool,
    approval_handler: Mutex<Option<Arc<dyn ApprovalHandler>>>,
}

impl ThreadShared {
    fn persist_plan(&self, plan: &Plan) -> Result<(), CodexError> {
        let mut state = lock_unpoisoned(&self.state);
        match state.store.as_mut() {
            Some(store) => {
                store.append_kind(SessionEntryKind::Plan {
                    explanation: plan.explanation.clone(),
                    steps: plan.steps.clone(),
                })?;
                state.plan_dirty = false;
            }
            None => state.plan_dirty = true,
        }
        Ok(())
    }
}

/// Exclusive claim on a thread for one turn. Dropping it lets the next turn in
/// and unregisters the turn from background-event routing.
pub(crate) struct TurnSlot {
    thread: Arc<ThreadShared>,
    registered: Option<String>,
}

impl TurnSlot {
    fn acquire(thread: &Arc<ThreadShared>) -> Result<Self, CodexError> {
        if thread
            .turn_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let thread_id = lock_unpoisoned(&thread.state)
                .thread_id()
                .unwrap_or("<unstarted>")
                .to_string();
            return Err(CodexError::TurnAlreadyActive { thread_id });
        }

        Ok(Self {
            thread: Arc::clone(thread),
            registered: None,
        })
    }

    fn register(&mut self, thread_id: &str, turn: ActiveTurn) {
        lock_unpoisoned(&self.thread.codex.active_turns).insert(thread_id.to_string(), turn);
        self.registered = Some(thread_id.to_string());
    }

    /// Background events sent after this fail with `NotFound`.
    pub(crate) fn unregister(&mut self) {
        if let Some(thread_id) = self.registered.take() {
            lock_unpoisoned(&self.thread.codex.active_turns).remove(&thread_id);
        }
    }
}

impl Drop for TurnSlot {
    fn drop(&mut self) {
        self.unregister();
        self.thread.turn_active.store(false, Ordering::Release);
    }
}

/// A conversation. Cloning yields another handle on the same thread.
#[derive(Clone)]
pub struct Thread {
    shared: Arc<ThreadShared>,
}

impl Thread {
    pub(crate) fn fresh(codex: Arc<CodexInner>, options: ThreadOptions) -> Self {
        Self::from_parts(
            codex,
            options,
            ThreadState {
                messages: Vec::new(),
                items: Vec::new(),
                next_item: 0,
                store: None,
                plan_version_seen: 0,
                plan_dirty: false,
            },
            Plan::default(),
        )
    }

    pub(crate) fn resumed(
        codex: Arc<CodexInner>,
        options: ThreadOptions,
        store: SessionStore,
    ) -> Result<Self, CodexError> {
        let mut messages = Vec::new();
        let mut items = Vec::new();
        let mut plan = Plan::default();

        for entry in store.replay_leaf(None)? {
            match entry.kind {
                SessionEntryKind::Item { item } => items.push(item),
                SessionEntryKind::Plan { explanation, steps } => plan = Plan { explanation, steps },
                kind => messages.extend(kind.to_run_message()),
            }
        }

        let next_item = items
            .iter()
            .filter_map(|item| item.id.strip_prefix("item_")?.parse::<u64>().ok())
            .max()
            .map_or(0, |last| last + 1);
        tracing::debug!(
            thread_id = store.session_id(),
            messages = messages.len(),
            items = items.len(),
            "resumed thread"
        );

        Ok(Self::from_parts(
            codex,
            options,
            ThreadState {
                messages,
                items,
                next_item,
                store: Some(store),
                plan_version_seen: 0,
                plan_dirty: false,
            },
            plan,
        ))
    }

    pub(crate) fn from_shared(shared: Arc<ThreadShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<ThreadShared> {
        &self.shared
    }

    fn from_parts(
        codex: Arc<CodexInner>,
        options: ThreadOptions,
        state: ThreadState,
        plan: Plan,
    ) -> Self {
        Self {
            shared: Arc::new(ThreadShared {
                codex,
                options,
                state: Mutex::new(state),
                plan: Arc::new(PlanStore::with_plan(plan)),
                turn_active: AtomicBool::new(false),
                approval_handler: Mutex::new(None),
            }),
        }
    }

    /// Assigned when the first turn starts; `None` until then.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        lock_unpoisoned(&self.shared.state)
            .thread_id()
            .map(str::to_string)
    }

    #[must_use]
    pub fn options(&self) -> &ThreadOptions {
        &self.shared.options
    }

    #[must_use]
    pub fn rollout_path(&self) -> Option<PathBuf> {
        lock_unpoisoned(&self.shared.state)
            .store
            .as_ref()
            .map(|store| store.path().to_path_buf())
    }

    /// Items of every completed turn, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ThreadItem> {
        lock_unpoisoned(&self.shared.state).items.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.turn_active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn plan(&self) -> Plan {
        Plan::clone(&self.shared.plan.snapshot())
    }

    /// Replaces the plan. The model sees it on its next turn.
    pub fn update_plan(
        &self,
        explanation: Option<String>,
        steps: Vec<PlanStep>,
    ) -> Result<Plan, CodexError> {
        if steps.iter().any(|step| step.step.trim().is_empty()) {
            return Err(CodexError::InvalidArgument(
                "Plan steps must have non-empty text".to_string(),
            ));
        }

        let plan = self.shared.plan.replace(Plan { explanation, steps });
        self.shared.persist_plan(&plan)?;
        Ok(Plan::clone(&plan))
    }

    /// Applies a batch of edits atomically. A rejected batch changes nothing.
    pub fn modify_plan(&self, operations: &[PlanOperation]) -> Result<Plan, CodexError> {
        let plan = self.shared.plan.modify(operations)?;
        self.shared.persist_plan(&plan)?;
        Ok(Plan::clone(&plan))
    }

    /// Approval handler for this thread only; takes precedence over the
    /// instance-wide one.
    pub fn set_approval_handler(&self, handler: impl ApprovalHandler) {
        *lock_unpoisoned(&self.shared.approval_handler) = Some(Arc::new(handler));
    }

    pub fn clear_approval_handler(&self) {
        *lock_unpoisoned(&self.shared.approval_handler) = None;
    }

    /// Starts a turn and returns its event stream.
    ///
    /// Input problems, an untrusted directory, and a turn already running are
    /// reported here, before any backend request. Everything after that is
    /// reported on the stream, which always ends with exactly one terminal
    /// event.
    pub async fn run_streamed(
        &self,
        input: impl Into<Input>,
        options: TurnOptions,
    ) -> Result<EventStream, CodexError> {
        let shared = &self.shared;
        let mut slot = TurnSlot::acquire(shared)?;

        let cwd = shared.options.resolve_working_directory()?;
        ensure_trusted_directory(&cwd, shared.options.skip_git_repo_check)?;
        let workspace = Workspace::new(&cwd, shared.options.sandbox_mode)?;
        let input = prepare_input(input.into(), workspace.root(), &shared.codex.http).await?;

        let (sink, stream) = event_channel();
        let (thread_id, thread_started, history, next_item, plan_version_seen) = {
            let mut state = lock_unpoisoned(&shared.state);
            let thread_started = state.store.is_none();
            if thread_started {
                state.store = Some(SessionStore::create_new(
                    &shared.codex.session_dir,
                    workspace.root(),
                )?);
            }
            let thread_id = state.thread_id().unwrap_or_default().to_string();
            (
                thread_id,
                thread_started,
                state.messages.clone(),
                state.next_item,
                state.plan_version_seen,
            )
        };

        if thread_started {
            shared.codex.track_thread(&thread_id, shared);
            tracing::info!(%thread_id, "thread started");
            sink.send(ThreadEvent::ThreadStarted {
                thread_id: thread_id.clone(),
            });
        }

        let cancel = options.cancel.unwrap_or_default();
        let notes = Arc::new(Mutex::new(Vec::new()));
        slot.register(
            &thread_id,
            ActiveTurn {
                sink: sink.clone(),
                notes: Arc::clone(&notes),
            },
        );

        let thread_handler = lock_unpoisoned(&shared.approval_handler).clone();
        let gate = ApprovalGate::new(
            Arc::clone(&shared.codex.approvals),
            thread_handler,
            shared.options.approval_mode,
            sink.clone(),
            cancel.clone(),
        );
        let builtins = BuiltinTools::new(
            workspace,
            shared.options.shell_timeout,
            Arc::clone(&shared.plan),
            cancel.clone(),
        );
        let dispatcher = ToolDispatcher::new(shared.codex.registry.clone(), builtins, gate);

        let executor = TurnExecutor::new(TurnSetup {
            thread: Arc::clone(shared),
            slot,
            thread_id,
            sink,
            cancel,
            notes,
            dispatcher,
            history,
            next_item,
            plan_version_seen,
            output_schema: options.output_schema,
        });
        tokio::spawn(executor.run(input));

        Ok(stream)
    }

    /// Runs a turn to completion and collects its items.
    pub async fn run(
        &self,
        input: impl Into<Input>,
        options: TurnOptions,
    ) -> Result<TurnResult, CodexError> {
        let mut stream = self.run_streamed(input, options).await?;
        let mut result = TurnResult::default();

        while let Some(event) = stream.next().await {
            match event {
                ThreadEvent::ItemCompleted { item } => {
                    if let ThreadItemDetails::AgentMessage { text } = &item.details {
                        result.final_response = text.clone();
                    }
                    result.items.push(item);
                }
                ThreadEvent::TurnCompleted { usage } => {
                    result.usage = usage;
                    return Ok(result);
                }
                ThreadEvent::TurnFailed { error } => {
                    return Err(CodexError::TurnFailed {
                        message: error.message,
                        code: error.code,
                    });
                }
                _ => {}
            }
        }

        Err(CodexError::TurnFailed {
            message: "Turn ended unexpectedly".to_string(),
            code: Some("internal".to_string()),
        })
    }
}

fn ensure_trusted_directory(dir: &Path, skip_check: bool) -> Result<(), CodexError> {
    if skip_check || dir.ancestors().any(|ancestor| ancestor.join(".git").exists()) {
        Ok(())
    } else {
        Err(CodexError::InvalidInput(UNTRUSTED_DIRECTORY_MESSAGE.to_string()))
    }
}
