use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use agent_provider::{ProviderProfile, RunId, RunProvider};
use session_store::{SessionPage, SessionStore, SessionStoreError};
use thread_protocol::ThreadEvent;

use crate::approval::{ApprovalHandler, ApprovalHub};
use crate::config::{CodexOptions, ThreadOptions};
use crate::dispatch::{ToolInterceptor, ToolRegistration, ToolRegistry};
use crate::error::CodexError;
use crate::fork::{fork_rollout, ForkOptions, ForkResult};
use crate::lock_unpoisoned;
use crate::stream::EventSink;
use crate::thread::{Thread, ThreadShared};
use crate::tools::BuiltinTool;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Handle on a running turn, used to inject background events.
pub(crate) struct ActiveTurn {
    pub(crate) sink: EventSink,
    pub(crate) notes: Arc<Mutex<Vec<String>>>,
}

pub(crate) struct CodexInner {
    pub(crate) options: CodexOptions,
    pub(crate) session_dir: PathBuf,
    pub(crate) provider: Arc<dyn RunProvider>,
    pub(crate) registry: ToolRegistry,
    pub(crate) approvals: Arc<ApprovalHub>,
    pub(crate) active_turns: Mutex<HashMap<String, ActiveTurn>>,
    /// Every thread with an id that still has a live handle. Resuming one of
    /// these returns the same handle, so a thread id has one history and one
    /// turn slot per instance.
    threads: Mutex<HashMap<String, Weak<ThreadShared>>>,
    pub(crate) http: reqwest::Client,
    next_run_id: AtomicU64,
}

impl CodexInner {
    pub(crate) fn next_run_id(&self) -> RunId {
        self.next_run_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn track_thread(&self, thread_id: &str, shared: &Arc<ThreadShared>) {
        let mut threads = lock_unpoisoned(&self.threads);
        threads.retain(|_, thread| thread.strong_count() > 0);
        threads.insert(thread_id.to_string(), Arc::downgrade(shared));
    }

    fn live_thread(
        threads: &HashMap<String, Weak<ThreadShared>>,
        thread_id: &str,
    ) -> Option<Arc<ThreadShared>> {
        threads.get(thread_id).and_then(Weak::upgrade)
    }
}

/// Engine instance: owns the provider, the registered tools, the approval
/// hub, and the rollout directory. Threads created here share all four.
#[derive(Clone)]
pub struct Codex {
    inner: Arc<CodexInner>,
}

impl Codex {
    pub fn new(provider: Arc<dyn RunProvider>, options: CodexOptions) -> Result<Self, CodexError> {
        let session_dir = options.resolve_session_dir()?;
        tracing::debug!(session_dir = %session_dir.display(), "codex instance created");

        Ok(Self {
            inner: Arc::new(CodexInner {
                options,
                session_dir,
                provider,
                registry: ToolRegistry::default(),
                approvals: Arc::new(ApprovalHub::default()),
                active_turns: Mutex::new(HashMap::new()),
                threads: Mutex::new(HashMap::new()),
                http: reqwest::Client::new(),
                next_run_id: AtomicU64::new(1),
            }),
        })
    }

    #[must_use]
    pub fn options(&self) -> &CodexOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn session_dir(&self) -> &std::path::Path {
        &self.inner.session_dir
    }

    #[must_use]
    pub fn provider_profile(&self) -> ProviderProfile {
        self.inner.provider.profile()
    }

    /// New thread without an id; the first turn assigns one.
    #[must_use]
    pub fn start_thread(&self, options: ThreadOptions) -> Thread {
        Thread::fresh(Arc::clone(&self.inner), options)
    }

    /// Rehydrates a thread from its rollout.
    ///
    /// While another handle on the same thread is alive, that handle is
    /// returned instead and `options` are ignored.
    pub fn resume_thread(&self, thread_id: &str, options: ThreadOptions) -> Result<Thread, CodexError> {
        let mut threads = lock_unpoisoned(&self.inner.threads);
        if let Some(shared) = CodexInner::live_thread(&threads, thread_id) {
            tracing::debug!(%thread_id, "resuming a live thread handle");
            return Ok(Thread::from_shared(shared));
        }

        let path = find_rollout(&self.inner.session_dir, thread_id)?;
        let store = SessionStore::open(&path)?;
        let thread = Thread::resumed(Arc::clone(&self.inner), options, store)?;
        threads.retain(|_, thread| thread.strong_count() > 0);
        threads.insert(thread_id.to_string(), Arc::downgrade(thread.shared()));
        Ok(thread)
    }

    /// Copies the history before the `nth_user_message`-th user message into
    /// a new rollout. The source rollout is only read.
    pub fn fork(&self, options: ForkOptions) -> Result<ForkResult, CodexError> {
        let cwd = options.thread_options.resolve_working_directory()?;
        fork_rollout(
            &self.inner.session_dir,
            &options.thread_id,
            options.nth_user_message,
            &cwd,
        )
    }

    /// Saved threads, newest first. Pass `next_cursor` back for the next page.
    pub fn list_threads(
        &self,
        page_size: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<SessionPage, CodexError> {
        SessionStore::list(
            &self.inner.session_dir,
            page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            cursor,
        )
        .map_err(|error| match error {
            SessionStoreError::InvalidCursor { cursor } => {
                CodexError::InvalidArgument(format!("Invalid page cursor: {cursor}"))
            }
            other => other.into(),
        })
    }

    /// Removes a saved thread. Returns false when there was none.
    pub fn delete_thread(&self, thread_id: &str) -> Result<bool, CodexError> {
        if lock_unpoisoned(&self.inner.active_turns).contains_key(thread_id) {
            return Err(CodexError::TurnAlreadyActive {
                thread_id: thread_id.to_string(),
            });
        }
        lock_unpoisoned(&self.inner.threads).remove(thread_id);
        match SessionStore::delete(&self.inner.session_dir, thread_id) {
            Err(SessionStoreError::InvalidSessionId { .. }) => Ok(false),
            other => Ok(other?),
        }
    }

    /// Adds a tool, replacing any registered tool or built-in with that name.
    pub fn register_tool(&self, registration: ToolRegistration) {
        self.inner.registry.register(registration);
    }

    /// Drops every registered tool; only built-ins remain.
    pub fn clear_registered_tools(&self) {
        self.inner.registry.clear();
    }

    /// Wraps the built-in `tool_name`, replacing any interceptor it had.
    /// A registered tool of the same name still takes precedence.
    pub fn register_tool_interceptor(
        &self,
        tool_name: &str,
        interceptor: impl ToolInterceptor,
    ) -> Result<(), CodexError> {
        let tool = BuiltinTool::from_name(tool_name).ok_or_else(|| {
            CodexError::InvalidArgument(format!("No built-in tool named `{tool_name}` to intercept"))
        })?;
        self.inner.registry.intercept(tool, Arc::new(interceptor));
        Ok(())
    }

    pub fn clear_tool_interceptors(&self) {
        self.inner.registry.clear_interceptors();
    }

    #[must_use]
    pub fn registered_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.registry.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Instance-wide approval handler, used by threads without their own.
    pub fn register_approval_callback(&self, handler: impl ApprovalHandler) {
        self.inner.approvals.set_handler(Arc::new(handler));
    }

    pub fn clear_approval_callback(&self) {
        self.inner.approvals.clear_handler();
    }

    /// Resolves an `approval.requested` event.
    pub fn respond_to_approval(&self, request_id: &str, approved: bool) -> Result<(), CodexError> {
        self.inner.approvals.respond(request_id, approved)
    }

    /// Emits `background_event` on the running turn of `thread_id` and queues
    /// the message as a note for the model's next request.
    pub fn send_background_event(
        &self,
        thread_id: &str,
        message: impl Into<String>,
    ) -> Result<(), CodexError> {
        let message = message.into();
        let active_turns = lock_unpoisoned(&self.inner.active_turns);
        let not_found = || {
            CodexError::NotFound(format!(
                "No active run for thread {thread_id}. Background events require a running turn."
            ))
        };
        let turn = active_turns.get(thread_id).ok_or_else(not_found)?;

        if !turn.sink.send(ThreadEvent::BackgroundEvent {
            message: message.clone(),
        }) {
            return Err(not_found());
        }
        lock_unpoisoned(&turn.notes).push(message);
        Ok(())
    }
}

pub(crate) fn find_rollout(
    session_dir: &std::path::Path,
    thread_id: &str,
) -> Result<PathBuf, CodexError> {
    SessionStore::find_by_id(session_dir, thread_id).map_err(|error| match error {
        SessionStoreError::SessionNotFound { .. } | SessionStoreError::InvalidSessionId { .. } => {
            CodexError::NotFound(format!("No saved conversation found for thread {thread_id}"))
        }
        other => other.into(),
    })
}
