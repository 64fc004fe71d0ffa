use std::path::Path;

use agent_provider::CancelSignal;
use regex::RegexBuilder;
use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use super::fs::Workspace;
use super::truncate_to_byte_limit;
use crate::dispatch::ToolResult;

const DEFAULT_MAX_RESULTS: usize = 100;
const MAX_FILE_BYTES: u64 = 1024 * 1024;
const MAX_OUTPUT_BYTES: usize = 64 * 1024;
const SKIPPED_DIRS: [&str; 3] = [".git", "node_modules", "target"];

#[derive(Debug, Deserialize)]
pub(crate) struct GrepArgs {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    case_insensitive: bool,
    #[serde(default)]
    max_results: Option<usize>,
}

pub(crate) async fn search(workspace: &Workspace, args: GrepArgs, cancel: &CancelSignal) -> ToolResult {
    let regex = match RegexBuilder::new(&args.pattern)
        .case_insensitive(args.case_insensitive)
        .build()
    {
        Ok(regex) => regex,
        Err(error) => return ToolResult::error(format!("Invalid regex pattern: {error}")),
    };

    let start = match args.path.as_deref() {
        Some(path) => match workspace.resolve_existing_path(path) {
            Ok(path) => path,
            Err(error) => return ToolResult::error(error),
        },
        None => workspace.root().to_path_buf(),
    };
    let max_results = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1);
    let workspace = workspace.clone();
    let cancel = cancel.clone();

    let joined = tokio::task::spawn_blocking(move || {
        collect_matches(&workspace, &start, &regex, max_results, &cancel)
    })
    .await;

    match joined {
        Ok(Some(matches)) if matches.is_empty() => ToolResult::ok("No matches found."),
        Ok(Some(matches)) => {
            let truncated = matches.len() >= max_results;
            let mut output = matches.join("\n");
            if truncated {
                output.push_str(&format!("\n[stopped after {max_results} matches]"));
            }
            ToolResult::ok(truncate_to_byte_limit(output, MAX_OUTPUT_BYTES))
        }
        Ok(None) => ToolResult::error("Search cancelled"),
        Err(error) => ToolResult::error(format!("Search failed: {error}")),
    }
}

/// Returns `None` when cancelled mid-walk.
fn collect_matches(
    workspace: &Workspace,
    start: &Path,
    regex: &regex::Regex,
    max_results: usize,
    cancel: &CancelSignal,
) -> Option<Vec<String>> {
    let mut matches = Vec::new();
    let walker = WalkDir::new(start)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));

    for entry in walker.filter_map(Result::ok) {
        if cancel.is_cancelled() {
            return None;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|meta| meta.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        // Binary and non-UTF-8 files are skipped.
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        let display = workspace.relative_display(entry.path());
        for (index, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!("{display}:{}:{line}", index + 1));
                if matches.len() >= max_results {
                    return Some(matches);
                }
            }
        }
    }

    Some(matches)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::SandboxMode;

    fn args(pattern: &str) -> GrepArgs {
        GrepArgs {
            pattern: pattern.to_string(),
            path: None,
            case_insensitive: false,
            max_results: None,
        }
    }

    fn seeded_workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("src dir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("git dir");
        std::fs::write(dir.path().join("src/a.rs"), "fn alpha() {}\nfn beta() {}\n")
            .expect("a.rs");
        std::fs::write(dir.path().join("src/b.rs"), "// Alpha notes\n").expect("b.rs");
        std::fs::write(dir.path().join(".git/config"), "fn alpha\n").expect("git config");
        let workspace =
            Workspace::new(dir.path(), SandboxMode::WorkspaceWrite).expect("workspace");
        (dir, workspace)
    }

    #[tokio::test]
    async fn reports_path_line_and_text() {
        let (_dir, workspace) = seeded_workspace();

        let result = search(&workspace, args("alpha"), &CancelSignal::new()).await;
        assert_eq!(result, ToolResult::ok("src/a.rs:1:fn alpha() {}"));
    }

    #[tokio::test]
    async fn case_insensitive_and_limits() {
        let (_dir, workspace) = seeded_workspace();
        let mut request = args("alpha");
        request.case_insensitive = true;
        request.max_results = Some(1);

        let result = search(&workspace, request, &CancelSignal::new()).await;
        assert_eq!(
            result,
            ToolResult::ok("src/a.rs:1:fn alpha() {}\n[stopped after 1 matches]")
        );
    }

    #[tokio::test]
    async fn invalid_patterns_and_empty_results() {
        let (_dir, workspace) = seeded_workspace();

        let invalid = search(&workspace, args("("), &CancelSignal::new()).await;
        assert!(!invalid.success);

        let empty = search(&workspace, args("gamma"), &CancelSignal::new()).await;
        assert_eq!(empty, ToolResult::ok("No matches found."));
    }
}
