use std::path::PathBuf;

use agent_provider::ProviderInitError;
use session_store::SessionStoreError;
use thiserror::Error;

/// Errors surfaced at the engine API boundary.
///
/// Tool failures never appear here: they are fed back to the model as
/// unsuccessful tool results and the turn continues.
#[derive(Debug, Error)]
pub enum CodexError {
    /// Rejected before any backend request was made.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("a turn is already running on thread {thread_id}")]
    TurnAlreadyActive { thread_id: String },

    /// Terminal failure of a turn driven through the collecting `run` form.
    #[error("{message}")]
    TurnFailed {
        message: String,
        code: Option<String>,
    },

    #[error(transparent)]
    Session(#[from] SessionStoreError),

    #[error("failed to initialize provider: {0}")]
    ProviderInit(#[from] ProviderInitError),

    #[error("io error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CodexError {
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code for failures that carry one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::TurnFailed { code, .. } => code.as_deref(),
            Self::TurnAlreadyActive { .. } => Some("turn_already_active"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CodexError;

    #[test]
    fn validation_messages_are_passed_through() {
        let error = CodexError::InvalidInput("Unsupported sandbox mode: open".to_string());
        assert_eq!(error.to_string(), "Unsupported sandbox mode: open");
        assert_eq!(error.code(), None);
    }

    #[test]
    fn turn_failures_expose_their_code() {
        let error = CodexError::TurnFailed {
            message: "Turn cancelled".to_string(),
            code: Some("cancelled".to_string()),
        };
        assert_eq!(error.code(), Some("cancelled"));
        assert_eq!(error.to_string(), "Turn cancelled");
    }
}
