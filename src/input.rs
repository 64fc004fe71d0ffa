//! Turn input and its normalization into model-facing content.
//!
//! Every check here runs before the turn is spawned, so a bad image never
//! reaches the backend.

use std::path::{Path, PathBuf};

use agent_provider::MessageContent;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CodexError;

/// One structured input item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserInput {
    Text { text: String },
    /// Relative paths resolve against the thread working directory.
    LocalImage { path: PathBuf },
    /// `http(s)` URL or base64 `data:` URL.
    Image { url: String },
    Skill { name: String, path: PathBuf },
    Mention { name: String, path: String },
    SkillContent { name: String, contents: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Items(Vec<UserInput>),
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<UserInput>> for Input {
    fn from(items: Vec<UserInput>) -> Self {
        Self::Items(items)
    }
}

/// Input after files were read, downloads fetched, and data URLs validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreparedInput {
    pub(crate) content: Vec<MessageContent>,
    /// Text parts joined for the history-only `user_message` item.
    pub(crate) text: String,
    pub(crate) images: Vec<String>,
}

pub(crate) async fn prepare_input(
    input: Input,
    cwd: &Path,
    http: &reqwest::Client,
) -> Result<PreparedInput, CodexError> {
    let items = match input {
        // Empty prompts are forwarded unchanged.
        Input::Text(text) => vec![UserInput::Text { text }],
        Input::Items(items) => items,
    };

    let mut content = Vec::with_capacity(items.len());
    let mut texts = Vec::new();
    let mut images = Vec::new();

    for item in items {
        match item {
            UserInput::Text { text } => {
                texts.push(text.clone());
                content.push(MessageContent::Text { text });
            }
            UserInput::LocalImage { path } => {
                let image_url = local_image_data_url(&resolve(cwd, &path)).await?;
                images.push(path.display().to_string());
                content.push(MessageContent::Image { image_url });
            }
            UserInput::Image { url } => {
                let image_url = remote_image_data_url(&url, http).await?;
                images.push(url);
                content.push(MessageContent::Image { image_url });
            }
            UserInput::Skill { name, path } => {
                let resolved = resolve(cwd, &path);
                let contents = tokio::fs::read_to_string(&resolved)
                    .await
                    .map_err(|source| CodexError::io("reading skill file", resolved, source))?;
                let text = skill_text(&name, &contents);
                texts.push(text.clone());
                content.push(MessageContent::Text { text });
            }
            UserInput::Mention { name, path } => {
                let text = format!("@{name} ({path})");
                texts.push(text.clone());
                content.push(MessageContent::Text { text });
            }
            UserInput::SkillContent { name, contents } => {
                let text = skill_text(&name, &contents);
                texts.push(text.clone());
                content.push(MessageContent::Text { text });
            }
        }
    }

    Ok(PreparedInput {
        content,
        text: texts.join("\n"),
        images,
    })
}

fn skill_text(name: &str, contents: &str) -> String {
    format!("<skill name=\"{name}\">\n{}\n</skill>", contents.trim_end())
}

fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

async fn local_image_data_url(path: &Path) -> Result<String, CodexError> {
    let mime = mime_for_path(path).ok_or_else(|| {
        CodexError::InvalidInput(format!("Unsupported image type: {}", path.display()))
    })?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CodexError::io("reading image", path, source))?;
    Ok(data_url(mime, &bytes))
}

async fn remote_image_data_url(url: &str, http: &reqwest::Client) -> Result<String, CodexError> {
    if url.starts_with("data:") {
        validate_data_url(url)?;
        return Ok(url.to_string());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CodexError::InvalidInput(format!(
            "Unsupported image URL scheme: {url}"
        )));
    }

    let download_error =
        |error: reqwest::Error| CodexError::InvalidInput(format!("Failed to download image {url}: {error}"));
    let response = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(download_error)?;

    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| value.starts_with("image/"));
    let mime = match header_mime {
        Some(mime) => mime,
        None => mime_for_path(Path::new(url.split(['?', '#']).next().unwrap_or(url)))
            .map(str::to_string)
            .ok_or_else(|| {
                CodexError::InvalidInput(format!("Could not determine image type of {url}"))
            })?,
    };

    let bytes = response.bytes().await.map_err(download_error)?;
    Ok(data_url(&mime, &bytes))
}

/// Checks that a `data:` URL carries an image and decodable base64.
pub(crate) fn validate_data_url(url: &str) -> Result<(), CodexError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| CodexError::InvalidInput("Image data URL must start with data:".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| CodexError::InvalidInput("Image data URL has no payload".to_string()))?;
    let Some(mime) = meta.strip_suffix(";base64") else {
        return Err(CodexError::InvalidInput(
            "Image data URL must be base64 encoded".to_string(),
        ));
    };
    if !mime.starts_with("image/") {
        return Err(CodexError::InvalidInput(format!(
            "Data URL is not an image: {mime}"
        )));
    }

    STANDARD
        .decode(payload.trim())
        .map(|_| ())
        .map_err(|error| CodexError::InvalidInput(format!("Invalid base64 image data: {error}")))
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => return None,
    })
}
