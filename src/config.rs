//! Engine, thread, and turn configuration.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use agent_provider::CancelSignal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodexError;

/// Home directory override; rollouts go to its `sessions/` subdirectory.
pub const HOME_ENV_VAR: &str = "CODEX_THREADS_HOME";
/// Replaces the built-in base instructions.
pub const INSTRUCTIONS_ENV_VAR: &str = "CODEX_THREADS_INSTRUCTIONS";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 64;
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_BASE_INSTRUCTIONS: &str = "You are a coding agent working in the user's \
repository. Use the provided tools to inspect and change files, keep the plan current with \
update_plan, and finish with a short summary of what you did.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    ReadOnly,
    #[default]
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// Gated actions are denied without asking.
    Never,
    OnRequest,
    /// Gated actions run; failures are reported to the model.
    #[default]
    OnFailure,
    Untrusted,
}

impl ApprovalMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::OnRequest => "on-request",
            Self::OnFailure => "on-failure",
            Self::Untrusted => "untrusted",
        }
    }

    /// True when an unhandled request is surfaced to the caller and awaited.
    #[must_use]
    pub fn waits_for_caller(&self) -> bool {
        matches!(self, Self::OnRequest | Self::Untrusted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Xhigh => "xhigh",
        }
    }
}

macro_rules! wire_enum_impls {
    ($ty:ty, $name:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = CodexError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                [$($variant),+]
                    .into_iter()
                    .find(|candidate| candidate.as_str() == trimmed)
                    .ok_or_else(|| {
                        CodexError::InvalidInput(format!("Unsupported {}: {}", $name, value))
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum_impls!(
    SandboxMode,
    "sandbox mode",
    [
        SandboxMode::ReadOnly,
        SandboxMode::WorkspaceWrite,
        SandboxMode::DangerFullAccess,
    ]
);
wire_enum_impls!(
    ApprovalMode,
    "approval mode",
    [
        ApprovalMode::Never,
        ApprovalMode::OnRequest,
        ApprovalMode::OnFailure,
        ApprovalMode::Untrusted,
    ]
);
wire_enum_impls!(
    ReasoningEffort,
    "reasoning effort",
    [
        ReasoningEffort::Minimal,
        ReasoningEffort::Low,
        ReasoningEffort::Medium,
        ReasoningEffort::High,
        ReasoningEffort::Xhigh,
    ]
);

/// Values read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub home: Option<PathBuf>,
    pub instructions: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            home: env_string_opt(HOME_ENV_VAR).map(PathBuf::from),
            instructions: env_string_opt(INSTRUCTIONS_ENV_VAR),
        }
    }
}

/// Instance-level settings shared by every thread of one [`crate::Codex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexOptions {
    /// Rollout directory. `None` means `<cwd>/.codex/sessions`.
    pub session_dir: Option<PathBuf>,
    pub base_instructions: String,
    pub max_tool_rounds: usize,
}

impl Default for CodexOptions {
    fn default() -> Self {
        Self {
            session_dir: None,
            base_instructions: DEFAULT_BASE_INSTRUCTIONS.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl CodexOptions {
    /// Defaults with [`EnvConfig`] overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env(EnvConfig::from_env())
    }

    #[must_use]
    pub fn with_env(mut self, env_config: EnvConfig) -> Self {
        if let Some(home) = env_config.home {
            self.session_dir = Some(home.join("sessions"));
        }
        if let Some(instructions) = env_config.instructions {
            self.base_instructions = instructions;
        }
        self
    }

    #[must_use]
    pub fn with_session_dir(mut self, session_dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(session_dir.into());
        self
    }

    #[must_use]
    pub fn with_base_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.base_instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub(crate) fn resolve_session_dir(&self) -> Result<PathBuf, CodexError> {
        match &self.session_dir {
            Some(dir) => absolutize(dir),
            None => {
                let cwd = current_dir()?;
                Ok(session_store::session_root(&cwd))
            }
        }
    }
}

/// Per-thread settings, fixed when the thread is started, resumed, or forked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOptions {
    pub model: Option<String>,
    pub sandbox_mode: SandboxMode,
    pub approval_mode: ApprovalMode,
    /// `None` means the process working directory.
    pub working_directory: Option<PathBuf>,
    pub skip_git_repo_check: bool,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub shell_timeout: Duration,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            model: None,
            sandbox_mode: SandboxMode::default(),
            approval_mode: ApprovalMode::default(),
            working_directory: None,
            skip_git_repo_check: false,
            reasoning_effort: None,
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }
}

impl ThreadOptions {
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_sandbox_mode(mut self, sandbox_mode: SandboxMode) -> Self {
        self.sandbox_mode = sandbox_mode;
        self
    }

    #[must_use]
    pub fn with_approval_mode(mut self, approval_mode: ApprovalMode) -> Self {
        self.approval_mode = approval_mode;
        self
    }

    #[must_use]
    pub fn with_working_directory(mut self, working_directory: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(working_directory.into());
        self
    }

    #[must_use]
    pub fn with_skip_git_repo_check(mut self, skip: bool) -> Self {
        self.skip_git_repo_check = skip;
        self
    }

    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    #[must_use]
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    pub(crate) fn resolve_working_directory(&self) -> Result<PathBuf, CodexError> {
        match &self.working_directory {
            Some(dir) => absolutize(dir),
            None => current_dir(),
        }
    }
}

/// Per-turn settings.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// JSON schema the final agent message must satisfy.
    pub output_schema: Option<Value>,
    /// External abort signal for the turn.
    pub cancel: Option<CancelSignal>,
}

impl TurnOptions {
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

fn current_dir() -> Result<PathBuf, CodexError> {
    env::current_dir().map_err(|source| CodexError::io("reading current directory", ".", source))
}

fn absolutize(path: &Path) -> Result<PathBuf, CodexError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(current_dir()?.join(path))
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn env_defaults_leave_options_untouched() {
        let _lock = env_lock();
        let _g1 = set_env_guard(HOME_ENV_VAR, None);
        let _g2 = set_env_guard(INSTRUCTIONS_ENV_VAR, None);

        let options = CodexOptions::from_env();
        assert_eq!(options, CodexOptions::default());
        assert_eq!(options.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
    }

    #[test]
    fn env_home_and_instructions_override_defaults() {
        let _lock = env_lock();
        let _g1 = set_env_guard(HOME_ENV_VAR, Some("/srv/codex"));
        let _g2 = set_env_guard(INSTRUCTIONS_ENV_VAR, Some("Be brief."));

        let options = CodexOptions::from_env();
        assert_eq!(
            options.session_dir.as_deref(),
            Some(Path::new("/srv/codex/sessions"))
        );
        assert_eq!(options.base_instructions, "Be brief.");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard(HOME_ENV_VAR, Some("  "));
        let _g2 = set_env_guard(INSTRUCTIONS_ENV_VAR, Some(""));

        assert_eq!(EnvConfig::from_env(), EnvConfig::default());
    }

    #[test]
    fn wire_spellings_parse_and_print() {
        assert_eq!(
            "danger-full-access".parse::<SandboxMode>().expect("sandbox"),
            SandboxMode::DangerFullAccess
        );
        assert_eq!(
            "on-request".parse::<ApprovalMode>().expect("approval"),
            ApprovalMode::OnRequest
        );
        assert_eq!(
            "xhigh".parse::<ReasoningEffort>().expect("effort"),
            ReasoningEffort::Xhigh
        );
        assert_eq!(SandboxMode::ReadOnly.to_string(), "read-only");
    }

    #[test]
    fn unknown_spellings_report_the_setting_name() {
        let error = "open".parse::<SandboxMode>().expect_err("unknown sandbox");
        assert_eq!(error.to_string(), "Unsupported sandbox mode: open");

        let error = "sometimes".parse::<ApprovalMode>().expect_err("unknown approval");
        assert_eq!(error.to_string(), "Unsupported approval mode: sometimes");
    }

    #[test]
    fn max_tool_rounds_is_at_least_one() {
        assert_eq!(CodexOptions::default().with_max_tool_rounds(0).max_tool_rounds, 1);
    }
}
