use codex_exec::config::ExecConfig;
use codex_exec::{execute, Args, ExecSettings};
use codex_threads::CancelSignal;
use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::Value;

fn settings_in(dir: &std::path::Path, extra: &[&str]) -> ExecSettings {
    std::fs::create_dir_all(dir.join("work")).expect("work dir");
    let config = ExecConfig {
        provider: Some("mock".to_string()),
        session_dir: Some(dir.join("sessions")),
        ..ExecConfig::default()
    };
    let work = dir.join("work");
    let mut argv = vec![
        "codex-exec".to_string(),
        "--skip-git-repo-check".to_string(),
        "--cd".to_string(),
        work.display().to_string(),
    ];
    argv.extend(extra.iter().map(|arg| arg.to_string()));
    let args = Args::try_parse_from(argv).expect("valid arguments");
    ExecSettings::resolve(&args, config).expect("settings")
}

fn event_types(output: &[u8]) -> Vec<Value> {
    String::from_utf8(output.to_vec())
        .expect("utf8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("one JSON event per line"))
        .collect()
}

#[tokio::test]
async fn prints_one_json_event_per_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut output = Vec::new();

    let succeeded = execute(
        settings_in(dir.path(), &[]),
        "hello".to_string(),
        CancelSignal::new(),
        &mut output,
    )
    .await
    .expect("run");

    assert!(succeeded);
    let events = event_types(&output);
    assert_eq!(events[0]["type"], "thread.started");
    assert_eq!(events[1]["type"], "turn.started");
    assert_eq!(events.last().expect("terminal")["type"], "turn.completed");
    assert!(events.iter().any(|event| {
        event["type"] == "item.completed" && event["item"]["text"] == "Echo: hello"
    }));
}

#[tokio::test]
async fn resume_continues_a_saved_thread() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut first = Vec::new();
    execute(
        settings_in(dir.path(), &[]),
        "one".to_string(),
        CancelSignal::new(),
        &mut first,
    )
    .await
    .expect("first run");
    let thread_id = event_types(&first)[0]["thread_id"]
        .as_str()
        .expect("thread id")
        .to_string();

    let mut second = Vec::new();
    let succeeded = execute(
        settings_in(dir.path(), &["--resume", &thread_id]),
        "two".to_string(),
        CancelSignal::new(),
        &mut second,
    )
    .await
    .expect("resumed run");

    assert!(succeeded);
    assert_eq!(event_types(&second)[0]["type"], "turn.started");
}

#[tokio::test]
async fn cancelled_turns_report_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cancel = CancelSignal::new();
    cancel.cancel();
    let mut output = Vec::new();

    let succeeded = execute(
        settings_in(dir.path(), &[]),
        "stop".to_string(),
        cancel,
        &mut output,
    )
    .await
    .expect("run");

    assert!(!succeeded);
    let events = event_types(&output);
    let last = events.last().expect("terminal");
    assert_eq!(last["type"], "turn.failed");
    assert_eq!(last["error"]["code"], "cancelled");
}
