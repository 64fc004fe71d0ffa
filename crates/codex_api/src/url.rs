/// Default base URL for Responses API requests.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Normalize a base URL to a Responses endpoint.
///
/// Normalization rules:
/// 1) keep a URL already ending in `/responses`
/// 2) append `/responses` otherwise (including ChatGPT `/codex` bases)
pub fn normalize_responses_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/responses") {
        return trimmed.to_string();
    }
    format!("{trimmed}/responses")
}
