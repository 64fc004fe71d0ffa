use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::SandboxMode;
use crate::dispatch::ToolResult;
use crate::error::CodexError;

const READ_MAX_BYTES: usize = 200 * 1024;

#[derive(Debug, Deserialize)]
pub(crate) struct ReadFileArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditFileArgs {
    path: String,
    old_text: String,
    new_text: String,
}

/// The thread working directory plus the sandbox rules for file access.
#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    root: PathBuf,
    sandbox: SandboxMode,
}

impl Workspace {
    pub(crate) fn new(root: &Path, sandbox: SandboxMode) -> Result<Self, CodexError> {
        let root = root
            .canonicalize()
            .map_err(|source| CodexError::io("resolving working directory", root, source))?;
        if !root.is_dir() {
            return Err(CodexError::InvalidInput(format!(
                "Working directory is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root, sandbox })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) async fn read_file(&self, args: ReadFileArgs) -> ToolResult {
        let resolved = match self.resolve_existing_path(&args.path) {
            Ok(path) => path,
            Err(error) => return ToolResult::error(error),
        };

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(bytes) => bytes,
            Err(error) => {
                return ToolResult::error(format!(
                    "Failed to read file {}: {error}",
                    resolved.display()
                ));
            }
        };

        if bytes.len() > READ_MAX_BYTES {
            return ToolResult::error(format!(
                "File exceeds max read size ({} bytes > {READ_MAX_BYTES} bytes)",
                bytes.len()
            ));
        }

        match String::from_utf8(bytes) {
            Ok(content) => ToolResult::ok(content),
            Err(_) => ToolResult::error("File is not valid UTF-8 text"),
        }
    }

    pub(crate) async fn write_file(&self, args: WriteFileArgs) -> ToolResult {
        if let Err(error) = self.ensure_writable() {
            return ToolResult::error(error);
        }

        let resolved = match self.resolve_write_path(&args.path) {
            Ok(path) => path,
            Err(error) => return ToolResult::error(error),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!(
                    "Failed to create parent directories {}: {error}",
                    parent.display()
                ));
            }

            let canonical_parent = match parent.canonicalize() {
                Ok(path) => path,
                Err(error) => {
                    return ToolResult::error(format!(
                        "Failed to resolve write parent {}: {error}",
                        parent.display()
                    ));
                }
            };

            if let Err(error) = self.ensure_inside_workspace(&canonical_parent) {
                return ToolResult::error(error);
            }
        }

        // A symlinked leaf is written through, so its target must be inside too.
        let resolved = match tokio::fs::symlink_metadata(&resolved).await {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let target = match resolved.canonicalize() {
                    Ok(path) => path,
                    Err(error) => {
                        return ToolResult::error(format!(
                            "Failed to resolve symlink {}: {error}",
                            resolved.display()
                        ));
                    }
                };
                if let Err(error) = self.ensure_inside_workspace(&target) {
                    return ToolResult::error(error);
                }
                target
            }
            _ => resolved,
        };

        if let Err(error) = tokio::fs::write(&resolved, args.content).await {
            return ToolResult::error(format!(
                "Failed to write file {}: {error}",
                resolved.display()
            ));
        }

        ToolResult::ok(format!("Wrote {}", self.relative_display(&resolved)))
    }

    pub(crate) async fn edit_file(&self, args: EditFileArgs) -> ToolResult {
        if let Err(error) = self.ensure_writable() {
            return ToolResult::error(error);
        }
        if args.old_text.is_empty() {
            return ToolResult::error("old_text must not be empty");
        }

        let resolved = match self.resolve_existing_path(&args.path) {
            Ok(path) => path,
            Err(error) => return ToolResult::error(error),
        };

        let current_content = match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(error) => {
                return ToolResult::error(format!(
                    "Failed to read file {}: {error}",
                    resolved.display()
                ));
            }
        };

        let occurrence_count = current_content.match_indices(&args.old_text).count();
        if occurrence_count != 1 {
            return ToolResult::error(format!(
                "edit_file requires exactly one match; found {occurrence_count}"
            ));
        }

        let updated_content = current_content.replacen(&args.old_text, &args.new_text, 1);
        if let Err(error) = tokio::fs::write(&resolved, updated_content).await {
            return ToolResult::error(format!(
                "Failed to write file {}: {error}",
                resolved.display()
            ));
        }

        ToolResult::ok(format!("Updated {}", self.relative_display(&resolved)))
    }

    pub(crate) fn resolve_existing_path(&self, path: &str) -> Result<PathBuf, String> {
        if path.trim().is_empty() {
            return Err("Path must not be empty".to_string());
        }

        let candidate = self.absolute_candidate(path);
        let canonical = candidate
            .canonicalize()
            .map_err(|error| format!("Failed to resolve path {}: {error}", candidate.display()))?;

        self.ensure_inside_workspace(&canonical)?;
        Ok(canonical)
    }

    fn resolve_write_path(&self, path: &str) -> Result<PathBuf, String> {
        if path.trim().is_empty() {
            return Err("Path must not be empty".to_string());
        }

        let candidate = self.absolute_candidate(path);
        let parent = candidate.parent().ok_or_else(|| {
            format!(
                "Path {} has no parent directory and cannot be written safely",
                candidate.display()
            )
        })?;

        let anchor = canonicalize_existing_ancestor(parent)?;
        self.ensure_inside_workspace(&anchor)?;

        Ok(candidate)
    }

    pub(crate) fn absolute_candidate(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_writable(&self) -> Result<(), String> {
        if self.sandbox == SandboxMode::ReadOnly {
            Err("File writes are not allowed in read-only sandbox mode".to_string())
        } else {
            Ok(())
        }
    }

    fn ensure_inside_workspace(&self, canonical_path: &Path) -> Result<(), String> {
        if self.sandbox == SandboxMode::DangerFullAccess || canonical_path.starts_with(&self.root)
        {
            Ok(())
        } else {
            Err(format!(
                "Path escapes workspace root: {}",
                canonical_path.display()
            ))
        }
    }

    pub(crate) fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|relative| relative.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, String> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor.canonicalize().map_err(|error| {
                format!("Failed to resolve path {}: {error}", ancestor.display())
            });
        }
    }

    Err(format!(
        "No existing ancestor found for path {}",
        path.display()
    ))
}
