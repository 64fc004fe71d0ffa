//! Non-interactive front-end: runs one turn and prints its events as JSON lines.

pub mod config;
pub mod providers;

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use codex_threads::{
    ApprovalMode, ApprovalRequest, CancelSignal, Codex, CodexOptions, Input, ReasoningEffort,
    SandboxMode, ThreadEvent, ThreadOptions, TurnOptions, UserInput,
};
use futures::StreamExt;

use crate::config::{ExecConfig, CONFIG_PATH_ENV_VAR};
use crate::providers::{provider_for_id, ProviderSettings, API_KEY_ENV_VAR, DEFAULT_PROVIDER_ID};

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "codex-exec", version, about = "Run one agent turn and print JSONL events")]
pub struct Args {
    /// Prompt text. Read from stdin when omitted or `-`.
    pub prompt: Option<String>,

    /// JSON config file.
    #[arg(long, env = CONFIG_PATH_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Backend: `mock` or `codex-api`.
    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// `read-only`, `workspace-write`, or `danger-full-access`.
    #[arg(long, short = 's')]
    pub sandbox: Option<String>,

    /// `never`, `on-request`, `on-failure`, or `untrusted`.
    #[arg(long)]
    pub approval: Option<String>,

    /// Working directory for the agent.
    #[arg(long = "cd", short = 'C')]
    pub cd: Option<PathBuf>,

    #[arg(long)]
    pub skip_git_repo_check: bool,

    /// Attach a local image; may be repeated.
    #[arg(long = "image", short = 'i')]
    pub images: Vec<PathBuf>,

    /// Continue a saved thread instead of starting a new one.
    #[arg(long)]
    pub resume: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,
}

/// Flags merged over the config file, ready to run.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    pub provider_id: String,
    pub provider: ProviderSettings,
    pub codex: CodexOptions,
    pub thread: ThreadOptions,
    pub resume: Option<String>,
    pub images: Vec<PathBuf>,
    pub log_level: String,
}

impl ExecSettings {
    pub fn resolve(args: &Args, file: ExecConfig) -> anyhow::Result<Self> {
        let model = file.select_model(args.model.as_deref())?;
        let provider_id = args
            .provider
            .clone()
            .or_else(|| file.provider.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string());

        let provider = ProviderSettings {
            api_key: file
                .api_key
                .clone()
                .or_else(|| std::env::var(API_KEY_ENV_VAR).ok()),
            model: model.clone(),
            base_url: file.base_url.clone(),
            timeout: file.timeout(),
            max_retries: file.max_retries,
        };

        let mut codex = CodexOptions::from_env();
        if let Some(session_dir) = &file.session_dir {
            codex = codex.with_session_dir(session_dir.clone());
        }
        if let Some(max_tool_rounds) = file.max_tool_rounds {
            codex = codex.with_max_tool_rounds(max_tool_rounds);
        }

        let mut thread = ThreadOptions::default().with_skip_git_repo_check(args.skip_git_repo_check);
        if let Some(model) = model {
            thread = thread.with_model(model);
        }
        if let Some(sandbox) = args.sandbox.as_deref().or(file.sandbox.as_deref()) {
            thread = thread.with_sandbox_mode(sandbox.parse::<SandboxMode>()?);
        }
        if let Some(approval) = args.approval.as_deref().or(file.approval.as_deref()) {
            thread = thread.with_approval_mode(approval.parse::<ApprovalMode>()?);
        }
        if let Some(effort) = &file.reasoning_effort {
            thread = thread.with_reasoning_effort(effort.parse::<ReasoningEffort>()?);
        }
        if let Some(cd) = &args.cd {
            thread = thread.with_working_directory(cd.clone());
        }

        Ok(Self {
            provider_id,
            provider,
            codex,
            thread,
            resume: args.resume.clone(),
            images: args.images.clone(),
            log_level: args
                .log_level
                .clone()
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    fn input(&self, prompt: String) -> Input {
        if self.images.is_empty() {
            return Input::Text(prompt);
        }
        let mut items = vec![UserInput::Text { text: prompt }];
        items.extend(
            self.images
                .iter()
                .map(|path| UserInput::LocalImage { path: path.clone() }),
        );
        Input::Items(items)
    }
}

/// Loads the config file named by `args`, if any.
pub fn load_config(args: &Args) -> anyhow::Result<ExecConfig> {
    match &args.config {
        Some(path) => ExecConfig::load(path),
        None => Ok(ExecConfig::default()),
    }
}

/// Returns the prompt from `args`, or reads it from `stdin`.
pub fn read_prompt(args: &Args, mut stdin: impl Read) -> anyhow::Result<String> {
    let prompt = match args.prompt.as_deref() {
        Some(prompt) if prompt != "-" => prompt.to_string(),
        _ => {
            let mut buffer = String::new();
            stdin
                .read_to_string(&mut buffer)
                .context("failed to read prompt from stdin")?;
            buffer
        }
    };

    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        bail!("No prompt provided. Pass it as an argument or on stdin.");
    }
    Ok(prompt)
}

async fn deny_without_prompt(request: ApprovalRequest) -> Result<bool, String> {
    tracing::warn!(kind = ?request.kind, "denying approval request; codex-exec cannot prompt");
    Ok(false)
}

/// Runs one turn, writing each event as a JSON line to `out`.
///
/// Returns `Ok(false)` when the turn failed.
pub async fn execute(
    settings: ExecSettings,
    prompt: String,
    cancel: CancelSignal,
    mut out: impl Write,
) -> anyhow::Result<bool> {
    let provider = provider_for_id(&settings.provider_id, &settings.provider)
        .map_err(anyhow::Error::msg)?;
    let codex = Codex::new(provider, settings.codex.clone())?;
    if settings.thread.approval_mode.waits_for_caller() {
        codex.register_approval_callback(deny_without_prompt);
    }

    let thread = match &settings.resume {
        Some(thread_id) => codex.resume_thread(thread_id, settings.thread.clone())?,
        None => codex.start_thread(settings.thread.clone()),
    };

    let input = settings.input(prompt);
    let mut stream = thread
        .run_streamed(input, TurnOptions::default().with_cancel(cancel))
        .await?;

    let mut succeeded = false;
    while let Some(event) = stream.next().await {
        match &event {
            ThreadEvent::TurnCompleted { .. } => succeeded = true,
            ThreadEvent::TurnFailed { error } => {
                tracing::info!(message = %error.message, "turn failed");
            }
            _ => {}
        }
        serde_json::to_writer(&mut out, &event).context("failed to encode event")?;
        writeln!(out).context("failed to write event")?;
        out.flush().context("failed to flush stdout")?;
    }

    Ok(succeeded)
}
