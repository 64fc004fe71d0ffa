use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use agent_provider::MessageContent;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SessionStoreError;
use crate::paths::{is_valid_session_id, session_id_from_file_name};
use crate::schema::{JsonLine, SessionEntryKind};
use crate::store::{parse_json_line, SessionStore};

const PREVIEW_CHARS: usize = 120;

/// Listing row for one rollout file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub path: PathBuf,
    pub created_at: String,
    pub cwd: String,
    pub forked_from: Option<String>,
    /// First user text, truncated.
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    /// Pass back to fetch the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl SessionStore {
    /// Finds the rollout file for `session_id` under `root`.
    pub fn find_by_id(root: &Path, session_id: &str) -> Result<PathBuf, SessionStoreError> {
        if !is_valid_session_id(session_id) {
            return Err(SessionStoreError::InvalidSessionId {
                session_id: session_id.to_string(),
            });
        }

        rollout_files(root)?
            .into_iter()
            .find(|path| file_session_id(path).as_deref() == Some(session_id))
            .ok_or_else(|| SessionStoreError::SessionNotFound {
                root: root.to_path_buf(),
                session_id: session_id.to_string(),
            })
    }

    /// Lists rollouts newest first. `cursor` is the value returned by the previous page.
    pub fn list(
        root: &Path,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<SessionPage, SessionStoreError> {
        let offset = match cursor {
            None => 0,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| SessionStoreError::InvalidCursor {
                    cursor: raw.to_string(),
                })?,
        };

        let mut summaries = Vec::new();
        for path in rollout_files(root)? {
            // Unreadable or foreign files are not sessions.
            if let Ok(summary) = read_summary(&path) {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|left, right| {
            sort_key(&right.created_at)
                .cmp(&sort_key(&left.created_at))
                .then_with(|| right.session_id.cmp(&left.session_id))
        });

        if offset > summaries.len() {
            return Err(SessionStoreError::InvalidCursor {
                cursor: offset.to_string(),
            });
        }

        let page_size = page_size.max(1);
        let end = offset.saturating_add(page_size).min(summaries.len());
        let next_cursor = (end < summaries.len()).then(|| end.to_string());
        let sessions = summaries.drain(offset..end).collect();

        Ok(SessionPage {
            sessions,
            next_cursor,
        })
    }

    /// Deletes the rollout for `session_id`. Returns false when none exists.
    pub fn delete(root: &Path, session_id: &str) -> Result<bool, SessionStoreError> {
        let path = match Self::find_by_id(root, session_id) {
            Ok(path) => path,
            Err(SessionStoreError::SessionNotFound { .. }) => return Ok(false),
            Err(error) => return Err(error),
        };

        std::fs::remove_file(&path)
            .map_err(|source| SessionStoreError::io("deleting session file", &path, source))?;
        Ok(true)
    }
}

fn rollout_files(root: &Path) -> Result<Vec<PathBuf>, SessionStoreError> {
    let read_dir = match std::fs::read_dir(root) {
        Ok(read_dir) => read_dir,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(SessionStoreError::io(
                "reading session directory",
                root,
                source,
            ))
        }
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry
            .map_err(|source| SessionStoreError::io("reading session directory", root, source))?;
        let path = entry.path();
        if path.is_file() && file_session_id(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_session_id(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    session_id_from_file_name(name).map(str::to_owned)
}

fn sort_key(created_at: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(created_at, &Rfc3339).ok()
}

fn read_summary(path: &Path) -> Result<SessionSummary, SessionStoreError> {
    let file =
        File::open(path).map_err(|source| SessionStoreError::io("opening session file", path, source))?;
    let mut lines = BufReader::new(file).lines().enumerate();

    let (_, first) = lines
        .next()
        .ok_or_else(|| SessionStoreError::MissingHeader {
            path: path.to_path_buf(),
        })?;
    let first = first.map_err(|source| SessionStoreError::io_line(path, 1, source))?;
    let JsonLine::Session(header) = parse_json_line(path, 1, &first)? else {
        return Err(SessionStoreError::InvalidHeaderRecord {
            path: path.to_path_buf(),
            line: 1,
        });
    };

    let mut preview = None;
    for (index, line) in lines {
        let line = line.map_err(|source| SessionStoreError::io_line(path, index + 1, source))?;
        if let Ok(JsonLine::Entry(entry)) = parse_json_line(path, index + 1, &line) {
            if let SessionEntryKind::UserInput { content } = entry.kind {
                preview = first_text(&content);
                break;
            }
        }
    }

    Ok(SessionSummary {
        session_id: header.session_id,
        path: path.to_path_buf(),
        created_at: header.created_at,
        cwd: header.cwd,
        forked_from: header.forked_from,
        preview,
    })
}

fn first_text(content: &[MessageContent]) -> Option<String> {
    content.iter().find_map(|part| match part {
        MessageContent::Text { text } if !text.trim().is_empty() => {
            Some(text.trim().chars().take(PREVIEW_CHARS).collect())
        }
        _ => None,
    })
}
