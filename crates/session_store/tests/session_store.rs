use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use agent_provider::{MessageContent, RunMessage};
use pretty_assertions::assert_eq;
use serde_json::json;
use session_store::{
    session_root, SessionEntry, SessionEntryKind, SessionHeader, SessionStore, SessionStoreError,
};
use tempfile::TempDir;
use thread_protocol::{PlanStep, StepStatus, ThreadItem, ThreadItemDetails};

fn write_session_file(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("session.jsonl");
    let mut file = File::create(&path).expect("session file should be created");

    for line in lines {
        writeln!(file, "{line}").expect("line should be written");
    }

    (dir, path)
}

fn write_empty_session_file() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("session.jsonl");
    File::create(&path).expect("empty session file should be created");
    (dir, path)
}

fn header_line(cwd: &Path) -> String {
    json!({
        "type": "session",
        "version": 1,
        "session_id": "session-1",
        "created_at": "2026-02-14T00:00:00Z",
        "cwd": cwd.display().to_string(),
    })
    .to_string()
}

fn user_entry_line(id: &str, parent_id: Option<&str>, ts: &str, text: &str) -> String {
    json!({
        "type": "entry",
        "id": id,
        "parent_id": parent_id,
        "ts": ts,
        "kind": "user_input",
        "content": [{"type": "text", "text": text}],
    })
    .to_string()
}

fn assistant_entry_line(id: &str, parent_id: Option<&str>, ts: &str, text: &str) -> String {
    json!({
        "type": "entry",
        "id": id,
        "parent_id": parent_id,
        "ts": ts,
        "kind": "assistant_text",
        "text": text,
    })
    .to_string()
}

#[test]
fn open_rejects_missing_header() {
    let (_dir, path) = write_empty_session_file();

    let error = SessionStore::open(&path)
        .err()
        .expect("empty file must fail");
    assert!(matches!(error, SessionStoreError::MissingHeader { .. }));
}

#[test]
fn open_rejects_non_header_first_line() {
    let (_dir, path) = write_session_file(&[user_entry_line(
        "entry-1",
        None,
        "2026-02-14T00:00:01Z",
        "hello",
    )]);

    let error = SessionStore::open(&path)
        .err()
        .expect("entry as first line must fail");
    assert!(matches!(
        error,
        SessionStoreError::InvalidHeaderRecord { line: 1, .. }
    ));
}

#[test]
fn open_rejects_unsupported_header_version() {
    let (_dir, path) = write_session_file(&[json!({
        "type": "session",
        "version": 2,
        "session_id": "session-1",
        "created_at": "2026-02-14T00:00:00Z",
        "cwd": "/tmp",
    })
    .to_string()]);

    let error = SessionStore::open(&path)
        .err()
        .expect("unsupported version must fail");
    assert!(matches!(
        error,
        SessionStoreError::UnsupportedVersion {
            line: 1,
            found: 2,
            ..
        }
    ));
}

#[test]
fn open_rejects_unknown_header_fields() {
    let (_dir, path) = write_session_file(&[json!({
        "type": "session",
        "version": 1,
        "session_id": "session-1",
        "created_at": "2026-02-14T00:00:00Z",
        "cwd": "/tmp",
        "unexpected": true,
    })
    .to_string()]);

    let error = SessionStore::open(&path)
        .err()
        .expect("unknown header field must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 1, .. }
    ));
}

#[test]
fn open_rejects_malformed_json_line_with_line_context() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let path = temp.path().join("session.jsonl");
    let mut file = File::create(&path).expect("session file should be created");
    writeln!(file, "{}", header_line(temp.path())).expect("header should be written");
    writeln!(file, "{{ this is invalid json").expect("invalid line should be written");

    let error = SessionStore::open(&path)
        .err()
        .expect("malformed json line must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn open_rejects_unknown_entry_fields() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let lines = vec![
        header_line(temp.path()),
        json!({
            "type": "entry",
            "id": "entry-1",
            "parent_id": null,
            "ts": "2026-02-14T00:00:01Z",
            "kind": "assistant_text",
            "text": "hi",
            "extra": "nope",
        })
        .to_string(),
    ];
    let (_dir, path) = write_session_file(&lines);

    let error = SessionStore::open(&path)
        .err()
        .expect("unknown entry field must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn open_rejects_unknown_entry_kind() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let lines = vec![
        header_line(temp.path()),
        json!({
            "type": "entry",
            "id": "entry-1",
            "parent_id": null,
            "ts": "2026-02-14T00:00:01Z",
            "kind": "unknown_kind",
            "text": "hi",
        })
        .to_string(),
    ];
    let (_dir, path) = write_session_file(&lines);

    let error = SessionStore::open(&path)
        .err()
        .expect("unknown entry kind must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn open_rejects_duplicate_entry_id() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let lines = vec![
        header_line(temp.path()),
        user_entry_line("entry-1", None, "2026-02-14T00:00:01Z", "first"),
        assistant_entry_line(
            "entry-1",
            Some("entry-1"),
            "2026-02-14T00:00:02Z",
            "duplicate",
        ),
    ];
    let (_dir, path) = write_session_file(&lines);

    let error = SessionStore::open(&path)
        .err()
        .expect("duplicate ids must fail");
    assert!(matches!(
        error,
        SessionStoreError::DuplicateEntryId { line: 3, .. }
    ));
}

#[test]
fn open_rejects_dangling_parent_id() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let lines = vec![
        header_line(temp.path()),
        assistant_entry_line(
            "entry-1",
            Some("missing"),
            "2026-02-14T00:00:01Z",
            "dangling",
        ),
    ];
    let (_dir, path) = write_session_file(&lines);

    let error = SessionStore::open(&path)
        .err()
        .expect("dangling parent id must fail");
    assert!(matches!(
        error,
        SessionStoreError::DanglingParentId { line: 2, .. }
    ));
}

#[test]
fn open_sets_current_leaf_from_append_order() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let lines = vec![
        header_line(temp.path()),
        user_entry_line("entry-1", None, "2026-02-14T00:00:01Z", "hello"),
        assistant_entry_line("entry-2", Some("entry-1"), "2026-02-14T00:00:02Z", "world"),
    ];
    let (_dir, path) = write_session_file(&lines);

    let store = SessionStore::open(&path).expect("valid session file should open");
    assert_eq!(store.current_leaf_id(), Some("entry-2"));
}

fn user_kind(text: &str) -> SessionEntryKind {
    SessionEntryKind::UserInput {
        content: vec![MessageContent::Text {
            text: text.to_string(),
        }],
    }
}

fn assistant_kind(text: &str) -> SessionEntryKind {
    SessionEntryKind::AssistantText {
        text: text.to_string(),
    }
}

fn new_store(cwd: &Path) -> SessionStore {
    SessionStore::create_new(&session_root(cwd), cwd).expect("create_new should succeed")
}

#[test]
fn open_accepts_fork_source_in_header() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let lines = vec![json!({
        "type": "session",
        "version": 1,
        "session_id": "session-2",
        "created_at": "2026-02-14T00:00:00Z",
        "cwd": temp.path().display().to_string(),
        "forked_from": "session-1",
    })
    .to_string()];
    let (_dir, path) = write_session_file(&lines);

    let store = SessionStore::open(&path).expect("forked header should open");
    assert_eq!(store.header().forked_from.as_deref(), Some("session-1"));
    assert_eq!(store.current_leaf_id(), None);
}

#[test]
fn create_new_uses_cwd_codex_sessions_root_and_writes_header() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let store = new_store(cwd_dir.path());

    let expected_root = cwd_dir.path().join(".codex").join("sessions");
    assert!(store.path().starts_with(&expected_root));

    let file = std::fs::read_to_string(store.path()).expect("session file should be readable");
    let mut lines = file.lines();
    let header_line = lines.next().expect("header line should exist");
    let parsed_header: SessionHeader =
        serde_json::from_str(header_line).expect("header should deserialize");

    assert_eq!(parsed_header.version, 1);
    assert_eq!(parsed_header.session_id, store.session_id());
    assert_eq!(parsed_header.created_at, store.header().created_at);
    assert_eq!(parsed_header.cwd, cwd_dir.path().display().to_string());
    assert_eq!(parsed_header.forked_from, None);
    assert!(lines.next().is_none());
    assert!(uuid_like(store.session_id()));
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}

#[test]
fn create_new_fails_when_session_root_is_unwritable() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let blocked_codex_path = cwd_dir.path().join(".codex");
    std::fs::write(&blocked_codex_path, "file blocks directory creation")
        .expect("blocker file should be created");

    let error = SessionStore::create_new(&session_root(cwd_dir.path()), cwd_dir.path())
        .err()
        .expect("create_new should fail when session root cannot be created");

    assert!(matches!(error, SessionStoreError::Io { .. }));
}

#[test]
fn create_new_rejects_relative_cwd() {
    let root = tempfile::tempdir().expect("tempdir should be created");

    let error = SessionStore::create_new(root.path(), Path::new("relative/dir"))
        .err()
        .expect("relative cwd must fail");
    assert!(matches!(error, SessionStoreError::NonAbsoluteCreateCwd { .. }));
}

#[test]
fn append_writes_each_entry_and_updates_leaf() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());

    let entry_1 = SessionEntry::new(
        "entry-1",
        None::<String>,
        "2026-02-14T00:00:01Z",
        user_kind("hello"),
    );
    store.append(entry_1).expect("first append should succeed");
    assert_eq!(store.current_leaf_id(), Some("entry-1"));

    let after_first_append =
        std::fs::read_to_string(store.path()).expect("session file should be readable");
    assert_eq!(after_first_append.lines().count(), 2);

    let entry_2 = SessionEntry::new(
        "entry-2",
        Some("entry-1"),
        "2026-02-14T00:00:02Z",
        assistant_kind("world"),
    );
    store.append(entry_2).expect("second append should succeed");
    assert_eq!(store.current_leaf_id(), Some("entry-2"));

    let reopened = SessionStore::open(store.path()).expect("reopen should succeed");
    assert_eq!(reopened.current_leaf_id(), Some("entry-2"));
    assert_eq!(reopened.entries(), store.entries());
}

#[test]
fn append_kind_links_to_current_leaf() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());

    let first = store.append_kind(user_kind("hi")).expect("append user");
    let second = store.append_kind(assistant_kind("hello")).expect("append assistant");

    assert_eq!(store.entries()[0].parent_id, None);
    assert_eq!(store.entries()[1].parent_id.as_deref(), Some(first.as_str()));
    assert_eq!(store.current_leaf_id(), Some(second.as_str()));
}

#[test]
fn append_kinds_writes_one_linked_chain() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());
    let first = store.append_kind(user_kind("before")).expect("append user");

    let ids = store
        .append_kinds(vec![user_kind("again"), assistant_kind("reply")])
        .expect("batch append should succeed");

    assert_eq!(ids.len(), 2);
    assert_eq!(store.entries()[1].parent_id.as_deref(), Some(first.as_str()));
    assert_eq!(store.entries()[2].parent_id.as_deref(), Some(ids[0].as_str()));
    assert_eq!(store.current_leaf_id(), Some(ids[1].as_str()));

    let reopened = SessionStore::open(store.path()).expect("reopen should succeed");
    assert_eq!(reopened.entries(), store.entries());
    assert_eq!(
        reopened
            .replay_leaf(None)
            .expect("replay should succeed")
            .len(),
        3
    );

    let before = std::fs::read_to_string(store.path()).expect("session file should be readable");
    assert!(store
        .append_kinds(Vec::new())
        .expect("empty batch")
        .is_empty());
    assert_eq!(
        std::fs::read_to_string(store.path()).expect("session file should be readable"),
        before
    );
}

#[test]
fn append_rejects_invalid_graph_updates() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());

    let entry_1 = SessionEntry::new(
        "entry-1",
        None::<String>,
        "2026-02-14T00:00:01Z",
        user_kind("hello"),
    );
    store.append(entry_1).expect("first append should succeed");

    let duplicate = SessionEntry::new(
        "entry-1",
        None::<String>,
        "2026-02-14T00:00:02Z",
        assistant_kind("duplicate"),
    );
    let duplicate_error = store
        .append(duplicate)
        .expect_err("duplicate entry id should fail append");
    assert!(matches!(
        duplicate_error,
        SessionStoreError::DuplicateEntryId { line: 3, .. }
    ));
    assert_eq!(store.current_leaf_id(), Some("entry-1"));

    let dangling = SessionEntry::new(
        "entry-2",
        Some("missing-parent"),
        "2026-02-14T00:00:02Z",
        assistant_kind("dangling"),
    );
    let dangling_error = store
        .append(dangling)
        .expect_err("dangling parent id should fail append");
    assert!(matches!(
        dangling_error,
        SessionStoreError::DanglingParentId { line: 3, .. }
    ));
    assert_eq!(store.current_leaf_id(), Some("entry-1"));
}

#[test]
fn replay_messages_reconstructs_run_message_sequence() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());

    store.append_kind(user_kind("hello")).expect("user append");
    store.append_kind(assistant_kind("working")).expect("assistant append");
    store
        .append_kind(SessionEntryKind::ToolCall {
            call_id: "call-1".to_string(),
            tool_name: "shell".to_string(),
            arguments: json!({"command": "echo hi"}),
        })
        .expect("tool call append");
    store
        .append_kind(SessionEntryKind::ToolResult {
            call_id: "call-1".to_string(),
            tool_name: "shell".to_string(),
            content: "hi".to_string(),
            is_error: false,
        })
        .expect("tool result append");
    store
        .append_kind(SessionEntryKind::Item {
            item: ThreadItem::new(
                "item_0",
                ThreadItemDetails::AgentMessage {
                    text: "working".to_string(),
                },
            ),
        })
        .expect("item append");
    store
        .append_kind(SessionEntryKind::Plan {
            explanation: None,
            steps: vec![PlanStep::new("ship", StepStatus::Pending)],
        })
        .expect("plan append");

    let reopened = SessionStore::open(store.path()).expect("reopen should succeed");
    let replayed = reopened
        .replay_messages()
        .expect("replay from current leaf should succeed");

    assert_eq!(
        replayed,
        vec![
            RunMessage::user_text("hello"),
            RunMessage::AssistantText {
                text: "working".to_string(),
            },
            RunMessage::ToolCall {
                call_id: "call-1".to_string(),
                tool_name: "shell".to_string(),
                arguments: json!({"command": "echo hi"}),
            },
            RunMessage::ToolResult {
                call_id: "call-1".to_string(),
                tool_name: "shell".to_string(),
                content: "hi".to_string(),
                is_error: false,
            },
        ]
    );
    assert_eq!(reopened.replay_leaf(None).expect("replay").len(), 6);
}

#[test]
fn replay_leaf_respects_explicit_target_leaf() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());

    store
        .append(SessionEntry::new(
            "entry-1",
            None::<String>,
            "2026-02-14T00:00:01Z",
            user_kind("root"),
        ))
        .expect("entry-1 append should succeed");
    store
        .append(SessionEntry::new(
            "entry-2",
            Some("entry-1"),
            "2026-02-14T00:00:02Z",
            assistant_kind("branch-a"),
        ))
        .expect("entry-2 append should succeed");
    store
        .append(SessionEntry::new(
            "entry-3",
            Some("entry-1"),
            "2026-02-14T00:00:03Z",
            assistant_kind("branch-b"),
        ))
        .expect("entry-3 append should succeed");

    let replayed: Vec<String> = store
        .replay_leaf(Some("entry-2"))
        .expect("targeted replay should succeed")
        .into_iter()
        .map(|entry| entry.id)
        .collect();

    assert_eq!(replayed, vec!["entry-1".to_string(), "entry-2".to_string()]);
}

#[test]
fn replay_leaf_rejects_unknown_leaf_id() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let mut store = new_store(cwd_dir.path());
    store.append_kind(user_kind("hello")).expect("append should succeed");

    let error = store
        .replay_leaf(Some("missing-leaf"))
        .expect_err("unknown leaf id must fail replay");
    assert!(matches!(error, SessionStoreError::UnknownLeafId { .. }));
}

#[test]
fn create_fork_copies_prefix_and_leaves_source_untouched() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let root = session_root(cwd_dir.path());
    let mut source = new_store(cwd_dir.path());
    source.append_kind(user_kind("one")).expect("append");
    source.append_kind(assistant_kind("first answer")).expect("append");
    source.append_kind(user_kind("two")).expect("append");
    let source_bytes = std::fs::read(source.path()).expect("read source");

    let chain = source.replay_leaf(None).expect("replay");
    let fork = SessionStore::create_fork(&root, &source, &chain[..2], cwd_dir.path())
        .expect("fork should be created");

    assert_ne!(fork.session_id(), source.session_id());
    assert_eq!(fork.header().forked_from.as_deref(), Some(source.session_id()));
    let reopened = SessionStore::open(fork.path()).expect("fork should reopen");
    let kinds: Vec<SessionEntryKind> = reopened
        .replay_leaf(None)
        .expect("replay fork")
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![user_kind("one"), assistant_kind("first answer")]);
    assert_eq!(
        std::fs::read(source.path()).expect("read source again"),
        source_bytes
    );
}

#[test]
fn find_by_id_and_delete_round_trip() {
    let cwd_dir = tempfile::tempdir().expect("tempdir should be created");
    let root = session_root(cwd_dir.path());
    let store = new_store(cwd_dir.path());
    let session_id = store.session_id().to_string();

    let found = SessionStore::find_by_id(&root, &session_id).expect("session should be found");
    assert_eq!(found, store.path());

    assert!(SessionStore::delete(&root, &session_id).expect("delete should succeed"));
    assert!(!SessionStore::delete(&root, &session_id).expect("second delete is a no-op"));
    assert!(matches!(
        SessionStore::find_by_id(&root, &session_id),
        Err(SessionStoreError::SessionNotFound { .. })
    ));
    assert!(matches!(
        SessionStore::find_by_id(&root, "../escape"),
        Err(SessionStoreError::InvalidSessionId { .. })
    ));
}

fn write_named_session(root: &Path, created_at: &str, session_id: &str, text: Option<&str>) {
    std::fs::create_dir_all(root).expect("session root should be created");
    let mut lines = vec![json!({
        "type": "session",
        "version": 1,
        "session_id": session_id,
        "created_at": created_at,
        "cwd": "/tmp",
    })
    .to_string()];
    if let Some(text) = text {
        lines.push(user_entry_line("entry-1", None, created_at, text));
    }
    let path = root.join(session_store::session_file_name(created_at, session_id));
    std::fs::write(path, lines.join("\n") + "\n").expect("session file should be written");
}

#[test]
fn list_pages_newest_first_with_previews() {
    let cwd = tempfile::tempdir().expect("tempdir should be created");
    let root = session_root(cwd.path());
    write_named_session(&root, "2026-02-14T00:00:00Z", "older", Some("first prompt"));
    write_named_session(&root, "2026-02-15T00:00:00Z", "newer", None);
    write_named_session(&root, "2026-02-16T00:00:00Z", "newest", Some("latest prompt"));
    std::fs::write(root.join("2026-02-17T00-00-00Z_broken.jsonl"), "{}")
        .expect("broken file should be written");

    let first = SessionStore::list(&root, 2, None).expect("first page");
    let ids: Vec<&str> = first
        .sessions
        .iter()
        .map(|summary| summary.session_id.as_str())
        .collect();
    assert_eq!(ids, vec!["newest", "newer"]);
    assert_eq!(first.sessions[0].preview.as_deref(), Some("latest prompt"));
    assert_eq!(first.sessions[1].preview, None);

    let cursor = first.next_cursor.expect("a second page should exist");
    let second = SessionStore::list(&root, 2, Some(&cursor)).expect("second page");
    assert_eq!(second.sessions.len(), 1);
    assert_eq!(second.sessions[0].session_id, "older");
    assert_eq!(second.next_cursor, None);
}

#[test]
fn list_handles_missing_root_and_bad_cursor() {
    let cwd = tempfile::tempdir().expect("tempdir should be created");
    let root = session_root(cwd.path());

    let empty = SessionStore::list(&root, 20, None).expect("missing root lists nothing");
    assert!(empty.sessions.is_empty());
    assert_eq!(empty.next_cursor, None);

    assert!(matches!(
        SessionStore::list(&root, 20, Some("not-a-cursor")),
        Err(SessionStoreError::InvalidCursor { .. })
    ));
}
