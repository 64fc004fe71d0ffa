use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SessionStoreError;
use crate::paths::{is_valid_session_id, session_file_name};
use crate::schema::{
    EntryRecordType, JsonLine, SessionEntry, SessionEntryKind, SessionHeader,
    ENTRY_ENVELOPE_FIELDS,
};

/// Append-only JSONL rollout for one session.
///
/// Line 1 is the [`SessionHeader`]; every following line is a [`SessionEntry`]
/// whose `parent_id` points at an earlier entry.
#[derive(Debug)]
pub struct SessionStore {
    pub(crate) path: PathBuf,
    pub(crate) file: File,
    pub(crate) header: SessionHeader,
    pub(crate) entries: Vec<SessionEntry>,
    pub(crate) index_by_id: HashMap<String, usize>,
    pub(crate) current_leaf_id: Option<String>,
}

impl SessionStore {
    /// Creates a rollout with a fresh v4 id under `root`.
    pub fn create_new(root: &Path, cwd: &Path) -> Result<Self, SessionStoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        Self::create_with_header(root, SessionHeader::v1(session_id, now_rfc3339()?, cwd_string(cwd)?))
    }

    /// Creates a new rollout seeded with `prefix`, recording `source` as its fork origin.
    ///
    /// Entries are copied in order and relinked into one linear chain. The
    /// source rollout is only read.
    pub fn create_fork(
        root: &Path,
        source: &SessionStore,
        prefix: &[SessionEntry],
        cwd: &Path,
    ) -> Result<Self, SessionStoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let header = SessionHeader::v1(session_id, now_rfc3339()?, cwd_string(cwd)?)
            .with_forked_from(source.session_id());
        let mut store = Self::create_with_header(root, header)?;

        for entry in prefix {
            let relinked = SessionEntry::new(
                entry.id.clone(),
                store.current_leaf_id.clone(),
                entry.ts.clone(),
                entry.kind.clone(),
            );
            store.append(relinked)?;
        }

        Ok(store)
    }

    fn create_with_header(root: &Path, header: SessionHeader) -> Result<Self, SessionStoreError> {
        if !is_valid_session_id(&header.session_id) {
            return Err(SessionStoreError::InvalidSessionId {
                session_id: header.session_id,
            });
        }

        std::fs::create_dir_all(root)
            .map_err(|source| SessionStoreError::io("creating session directory", root, source))?;

        let path = root.join(session_file_name(&header.created_at, &header.session_id));
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|source| SessionStoreError::io("creating session file", &path, source))?;

        let line = serde_json::to_string(&header)
            .map_err(|source| SessionStoreError::json_serialize(&path, source))?;
        write_line(&mut file, &path, &line)?;

        Ok(Self {
            path,
            file,
            header,
            entries: Vec::new(),
            index_by_id: HashMap::new(),
            current_leaf_id: None,
        })
    }

    pub fn open(path: &Path) -> Result<Self, SessionStoreError> {
        let path = path.to_path_buf();
        let read_file = File::open(&path)
            .map_err(|source| SessionStoreError::io("opening session file", &path, source))?;
        let reader = BufReader::new(read_file);

        let mut header: Option<SessionHeader> = None;
        let mut entries_with_lines: Vec<(usize, SessionEntry)> = Vec::new();
        let mut index_by_id = HashMap::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            let line = line_result
                .map_err(|source| SessionStoreError::io_line(&path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = parse_json_line(&path, line_number, &line)?;

            if header.is_none() {
                match parsed {
                    JsonLine::Session(parsed_header) => {
                        validate_header_line(&path, line_number, &parsed_header)?;
                        header = Some(parsed_header);
                    }
                    JsonLine::Entry(_) => {
                        return Err(SessionStoreError::InvalidHeaderRecord {
                            path,
                            line: line_number,
                        });
                    }
                }

                continue;
            }

            match parsed {
                JsonLine::Session(_) => {
                    return Err(SessionStoreError::InvalidEntryRecord {
                        path,
                        line: line_number,
                    });
                }
                JsonLine::Entry(entry) => {
                    validate_entry_line(&path, line_number, &entry)?;
                    if index_by_id.contains_key(&entry.id) {
                        return Err(SessionStoreError::DuplicateEntryId {
                            path,
                            line: line_number,
                            id: entry.id,
                        });
                    }

                    let next_index = entries_with_lines.len();
                    index_by_id.insert(entry.id.clone(), next_index);
                    entries_with_lines.push((line_number, entry));
                }
            }
        }

        let header =
            header.ok_or_else(|| SessionStoreError::MissingHeader { path: path.clone() })?;
        validate_entry_graph(&path, &entries_with_lines, &index_by_id)?;

        let entries = entries_with_lines
            .into_iter()
            .map(|(_, entry)| entry)
            .collect::<Vec<_>>();
        let current_leaf_id = entries.last().map(|entry| entry.id.clone());

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| {
                SessionStoreError::io("opening session file for append", &path, source)
            })?;

        Ok(Self {
            path,
            file,
            header,
            entries,
            index_by_id,
            current_leaf_id,
        })
    }

    /// Appends a fully formed entry. Its id must be new and its parent known.
    pub fn append(&mut self, entry: SessionEntry) -> Result<(), SessionStoreError> {
        let line_number = self.entries.len() + 2;
        validate_entry_line(&self.path, line_number, &entry)?;

        if self.index_by_id.contains_key(&entry.id) {
            return Err(SessionStoreError::DuplicateEntryId {
                path: self.path.clone(),
                line: line_number,
                id: entry.id,
            });
        }
        if let Some(parent_id) = &entry.parent_id {
            if !self.index_by_id.contains_key(parent_id) {
                return Err(SessionStoreError::DanglingParentId {
                    path: self.path.clone(),
                    line: line_number,
                    entry_id: entry.id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }

        let line = serde_json::to_string(&entry)
            .map_err(|source| SessionStoreError::json_serialize(&self.path, source))?;
        write_line(&mut self.file, &self.path, &line)?;

        self.index_by_id
            .insert(entry.id.clone(), self.entries.len());
        self.current_leaf_id = Some(entry.id.clone());
        self.entries.push(entry);
        Ok(())
    }

    /// Appends `kind` as a child of the current leaf and returns the new entry id.
    pub fn append_kind(&mut self, kind: SessionEntryKind) -> Result<String, SessionStoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let entry = SessionEntry::new(id.clone(), self.current_leaf_id.clone(), now_rfc3339()?, kind);
        self.append(entry)?;
        Ok(id)
    }

    /// Appends `kinds` as one linked chain under the current leaf with a single write.
    ///
    /// Either every entry lands or none does: a failed write truncates the file
    /// back to its previous length and leaves the in-memory state untouched.
    pub fn append_kinds(
        &mut self,
        kinds: impl IntoIterator<Item = SessionEntryKind>,
    ) -> Result<Vec<String>, SessionStoreError> {
        let ts = now_rfc3339()?;
        let mut parent_id = self.current_leaf_id.clone();
        let mut batch = Vec::new();
        let mut buffer = String::new();

        for kind in kinds {
            let id = uuid::Uuid::new_v4().to_string();
            let entry = SessionEntry::new(id.clone(), parent_id.take(), ts.clone(), kind);
            let line = serde_json::to_string(&entry)
                .map_err(|source| SessionStoreError::json_serialize(&self.path, source))?;
            buffer.push_str(&line);
            buffer.push('\n');
            parent_id = Some(id);
            batch.push(entry);
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let previous_len = self
            .file
            .metadata()
            .map_err(|source| SessionStoreError::io("reading session file length", &self.path, source))?
            .len();
        if let Err(source) = self
            .file
            .write_all(buffer.as_bytes())
            .and_then(|()| self.file.flush())
        {
            if let Err(truncate_error) = self.file.set_len(previous_len) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %truncate_error,
                    "failed to roll back a partial session write"
                );
            }
            return Err(SessionStoreError::io("writing session lines", &self.path, source));
        }

        let mut ids = Vec::with_capacity(batch.len());
        for entry in batch {
            self.index_by_id.insert(entry.id.clone(), self.entries.len());
            self.current_leaf_id = Some(entry.id.clone());
            ids.push(entry.id.clone());
            self.entries.push(entry);
        }
        Ok(ids)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &SessionHeader {
        &self.header
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.header.session_id
    }

    #[must_use]
    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    #[must_use]
    pub fn current_leaf_id(&self) -> Option<&str> {
        self.current_leaf_id.as_deref()
    }
}

fn write_line(file: &mut File, path: &Path, line: &str) -> Result<(), SessionStoreError> {
    writeln!(file, "{line}")
        .and_then(|()| file.flush())
        .map_err(|source| SessionStoreError::io("writing session line", path, source))
}

fn cwd_string(cwd: &Path) -> Result<String, SessionStoreError> {
    if !cwd.is_absolute() {
        return Err(SessionStoreError::NonAbsoluteCreateCwd {
            path: cwd.to_path_buf(),
        });
    }
    Ok(cwd.display().to_string())
}

pub(crate) fn now_rfc3339() -> Result<String, SessionStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(SessionStoreError::ClockFormat)
}

pub(crate) fn parse_json_line(
    path: &Path,
    line_number: usize,
    line: &str,
) -> Result<JsonLine, SessionStoreError> {
    let value = serde_json::from_str::<Value>(line)
        .map_err(|source| SessionStoreError::json_line(path, line_number, source))?;
    let record_type = value.get("type").and_then(Value::as_str).map(str::to_owned);

    match record_type.as_deref() {
        Some("session") => serde_json::from_value::<SessionHeader>(value)
            .map(JsonLine::Session)
            .map_err(|source| SessionStoreError::json_line(path, line_number, source)),
        Some("entry") => parse_entry(path, line_number, value).map(JsonLine::Entry),
        _ => Err(SessionStoreError::InvalidEntryRecord {
            path: path.to_path_buf(),
            line: line_number,
        }),
    }
}

fn parse_entry(
    path: &Path,
    line_number: usize,
    value: Value,
) -> Result<SessionEntry, SessionStoreError> {
    let invalid = || SessionStoreError::InvalidEntryRecord {
        path: path.to_path_buf(),
        line: line_number,
    };
    let Value::Object(mut fields) = value else {
        return Err(invalid());
    };

    let mut envelope = Map::new();
    for key in ENTRY_ENVELOPE_FIELDS {
        if let Some(field) = fields.remove(key) {
            envelope.insert(key.to_owned(), field);
        }
    }

    let id = envelope
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(invalid)?
        .to_owned();
    let parent_id = match envelope.get("parent_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(parent)) => Some(parent.clone()),
        Some(_) => return Err(invalid()),
    };
    let ts = envelope
        .get("ts")
        .and_then(Value::as_str)
        .ok_or_else(invalid)?
        .to_owned();
    let kind = serde_json::from_value::<SessionEntryKind>(Value::Object(fields))
        .map_err(|source| SessionStoreError::json_line(path, line_number, source))?;

    Ok(SessionEntry {
        record_type: EntryRecordType::Entry,
        id,
        parent_id,
        ts,
        kind,
    })
}

pub(crate) fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &SessionHeader,
) -> Result<(), SessionStoreError> {
    if header.version != 1 {
        return Err(SessionStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)?;

    if !Path::new(&header.cwd).is_absolute() {
        return Err(SessionStoreError::NonAbsoluteCwd {
            path: path.to_path_buf(),
            line: line_number,
            cwd: header.cwd.clone(),
        });
    }

    Ok(())
}

pub(crate) fn validate_entry_line(
    path: &Path,
    line_number: usize,
    entry: &SessionEntry,
) -> Result<(), SessionStoreError> {
    validate_rfc3339(path, line_number, "ts", &entry.ts)
}

pub(crate) fn validate_entry_graph(
    path: &Path,
    entries_with_lines: &[(usize, SessionEntry)],
    index_by_id: &HashMap<String, usize>,
) -> Result<(), SessionStoreError> {
    for (line_number, entry) in entries_with_lines {
        if let Some(parent_id) = &entry.parent_id {
            if !index_by_id.contains_key(parent_id) {
                return Err(SessionStoreError::DanglingParentId {
                    path: path.to_path_buf(),
                    line: *line_number,
                    entry_id: entry.id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }
    }

    Ok(())
}

pub(crate) fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SessionStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(SessionStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
