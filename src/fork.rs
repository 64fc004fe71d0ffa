use std::path::{Path, PathBuf};

use session_store::{SessionEntry, SessionStore};

use crate::codex::find_rollout;
use crate::config::ThreadOptions;
use crate::error::CodexError;

/// Where to cut a saved thread.
#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    pub thread_id: String,
    /// Zero-based. The fork keeps everything strictly before this user
    /// message; `0` yields an empty history.
    pub nth_user_message: usize,
    pub thread_options: ThreadOptions,
}

impl ForkOptions {
    pub fn new(thread_id: impl Into<String>, nth_user_message: usize) -> Self {
        Self {
            thread_id: thread_id.into(),
            nth_user_message,
            thread_options: ThreadOptions::default(),
        }
    }

    #[must_use]
    pub fn with_thread_options(mut self, thread_options: ThreadOptions) -> Self {
        self.thread_options = thread_options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkResult {
    pub thread_id: String,
    /// Rollout file written for the fork.
    pub rollout_path: PathBuf,
}

pub(crate) fn fork_rollout(
    session_dir: &Path,
    source_id: &str,
    nth_user_message: usize,
    cwd: &Path,
) -> Result<ForkResult, CodexError> {
    let source = SessionStore::open(&find_rollout(session_dir, source_id)?)?;
    let chain = source.replay_leaf(None)?;
    let prefix = fork_prefix(&chain, nth_user_message).ok_or_else(|| {
        CodexError::NotFound(format!(
            "Thread {source_id} has no user message at index {nth_user_message}"
        ))
    })?;

    let fork = SessionStore::create_fork(session_dir, &source, prefix, cwd)?;
    tracing::info!(
        source = source_id,
        fork = fork.session_id(),
        entries = prefix.len(),
        "forked thread"
    );

    Ok(ForkResult {
        thread_id: fork.session_id().to_string(),
        rollout_path: fork.path().to_path_buf(),
    })
}

/// Entries before the `nth` user input. `nth` equal to the user input count
/// keeps the whole chain; anything larger is out of range.
pub(crate) fn fork_prefix(entries: &[SessionEntry], nth: usize) -> Option<&[SessionEntry]> {
    let mut seen = 0;
    for (index, entry) in entries.iter().enumerate() {
        if entry.kind.is_user_input() {
            if seen == nth {
                return Some(&entries[..index]);
            }
            seen += 1;
        }
    }

    (seen == nth).then_some(entries)
}
