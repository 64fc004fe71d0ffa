use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum CodexApiError {
    MissingApiKey,
    InvalidHeader(String),
    InvalidRequestPayload(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    Cancelled,
    Unknown(String),
}

impl CodexApiError {
    /// Machine-readable code for callers that surface structured failures.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::MissingApiKey => Some("missing_api_key".to_owned()),
            Self::Status(status, _) => Some(format!("http_{}", status.as_u16())),
            Self::RetryExhausted { .. } => Some("retry_exhausted".to_owned()),
            Self::StreamFailed { code, .. } => code.clone(),
            Self::Cancelled => Some("cancelled".to_owned()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub plan_type: Option<String>,
    pub resets_at: Option<u64>,
}

impl ErrorPayloadFields {
    pub fn usage_limit_message(&self, status: StatusCode) -> Option<String> {
        let code = self
            .code
            .as_deref()
            .and_then(non_empty_string)
            .or_else(|| self.type_.as_deref().and_then(non_empty_string))
            .unwrap_or("");
        if !matches_usage_limit(code, status) {
            return None;
        }

        let plan = self
            .plan_type
            .as_deref()
            .and_then(non_empty_string)
            .map(|value| format!(" ({} plan)", value.to_ascii_lowercase()))
            .unwrap_or_default();
        let mins = self
            .resets_at
            .filter(|value| *value > 0)
            .and_then(|reset_sec| (reset_sec as i64).checked_mul(1000))
            .and_then(|reset_millis| reset_millis.checked_sub(current_epoch_ms()))
            .map(|delta| (delta.max(0) as f64 / 60_000f64).round() as i64);
        let retry_hint = mins
            .map(|value| format!(" Try again in ~{value} min."))
            .unwrap_or_default();

        Some(
            format!("You have hit your usage limit{plan}.{retry_hint}")
                .trim()
                .to_string(),
        )
    }
}

impl fmt::Display for CodexApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "API key is required"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::InvalidRequestPayload(message) => {
                write!(f, "invalid request payload: {message}")
            }
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::StreamFailed { code, message } => match code {
                Some(code) if !code.trim().is_empty() => {
                    write!(f, "stream failed ({code}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for CodexApiError {}

impl From<reqwest::Error> for CodexApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for CodexApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.to_string()
        }
    };

    let Ok(parsed) = serde_json::from_str::<ErrorPayload>(body) else {
        return fallback();
    };

    if let Some(error) = parsed.value {
        if let Some(message) = error.usage_limit_message(status) {
            return message;
        }
        if let Some(message) = error.message.as_deref().and_then(non_empty_string) {
            return message.to_owned();
        }
    }

    fallback()
}

pub(crate) fn has_usage_limit_message(message: &str) -> bool {
    message.contains("usage limit")
}

fn matches_usage_limit(code: &str, status: StatusCode) -> bool {
    matches!(status, StatusCode::TOO_MANY_REQUESTS)
        || code.eq_ignore_ascii_case("usage_limit_reached")
        || code.eq_ignore_ascii_case("usage_not_included")
        || code.eq_ignore_ascii_case("rate_limit_exceeded")
}

fn current_epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
