use std::process::ExitCode;

use clap::Parser;
use codex_exec::{execute, load_config, read_prompt, Args, ExecSettings};
use codex_threads::CancelSignal;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let settings = ExecSettings::resolve(&args, load_config(&args)?)?;
    codex_threads::logging::init_subscriber(&settings.log_level);
    let prompt = read_prompt(&args, std::io::stdin())?;

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; cancelling the turn");
            on_interrupt.cancel();
        }
    });

    execute(settings, prompt, cancel, std::io::stdout().lock()).await
}
