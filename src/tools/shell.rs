use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use agent_provider::CancelSignal;
use serde::Deserialize;
use tokio::process::Command;

use super::truncate_to_byte_limit;
use crate::dispatch::{ToolOutcome, ToolResult};

const MAX_OUTPUT_BYTES: usize = 100 * 1024;

#[derive(Debug, Deserialize)]
pub(crate) struct ShellArgs {
    command: String,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

/// Runs `bash -lc <command>` in `cwd`. The child is killed on timeout and on
/// cancellation.
pub(crate) async fn run(
    args: ShellArgs,
    cwd: &Path,
    default_timeout: Duration,
    cancel: &CancelSignal,
) -> ToolOutcome {
    if args.command.trim().is_empty() {
        return ToolResult::error("command must not be empty").into();
    }

    let timeout = args
        .timeout_sec
        .filter(|seconds| *seconds > 0)
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);

    let child = Command::new("bash")
        .arg("-lc")
        .arg(&args.command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(error) => {
            return ToolResult::error(format!("Failed to launch bash command: {error}")).into();
        }
    };

    tracing::debug!(command = %args.command, "running shell command");
    let output = tokio::select! {
        output = tokio::time::timeout(timeout, child.wait_with_output()) => output,
        _ = cancel.cancelled() => {
            return ToolResult::error("Command cancelled").into();
        }
    };

    let output = match output {
        Ok(Ok(output)) => output,
        Ok(Err(error)) => {
            return ToolResult::error(format!("Failed waiting for bash command: {error}")).into();
        }
        Err(_) => {
            return ToolOutcome {
                result: ToolResult::error(format!(
                    "status: timeout after {}s",
                    timeout.as_secs_f32()
                )),
                exit_code: None,
                declined: false,
            };
        }
    };

    let exit_code = output.status.code();
    let status_label = match exit_code {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    };
    let content = truncate_to_byte_limit(
        format!(
            "status: {status_label}\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
        MAX_OUTPUT_BYTES,
    );

    let result = if output.status.success() {
        ToolResult::ok(content)
    } else {
        ToolResult::error(content)
    };
    ToolOutcome {
        result,
        exit_code,
        declined: false,
    }
}
