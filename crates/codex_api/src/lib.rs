//! Transport-only client for OpenAI Responses-compatible backends.
//!
//! This crate owns request building, header/URL normalization, SSE parsing and
//! the opt-in retry layer. It holds no conversation state and no auth flows:
//! callers pass an API key and get back normalized [`CodexStreamEvent`]s.
//!
//! Function-call output items are surfaced as
//! [`CodexStreamEvent::ToolCallRequested`] with the raw argument text, so
//! malformed payloads reach the caller instead of being dropped here.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::CodexApiClient;
pub use client::StreamResult;
pub use config::CodexApiConfig;
pub use error::CodexApiError;
pub use events::{CodexResponseStatus, CodexStreamEvent, CodexUsage};
pub use payload::CodexRequest;
pub use sse::SseStreamParser;
pub use url::normalize_responses_url;
