//! Optional JSON config file for `codex-exec`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

pub const CONFIG_PATH_ENV_VAR: &str = "CODEX_EXEC_CONFIG_PATH";

/// File contents. Every field is optional; command line flags win over them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Models the run may use. The first one is the default model.
    pub models: Option<Vec<String>>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_sec: Option<u64>,
    pub max_retries: Option<u32>,
    pub sandbox: Option<String>,
    pub approval: Option<String>,
    pub reasoning_effort: Option<String>,
    pub session_dir: Option<PathBuf>,
    pub max_tool_rounds: Option<usize>,
    pub log_level: Option<String>,
}

impl ExecConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_sec == Some(0) {
            bail!("timeout_sec must be greater than zero");
        }
        if let Some(models) = &self.models {
            if models.is_empty() {
                bail!("models must not be empty");
            }
            if models.iter().any(|model| model.trim().is_empty()) {
                bail!("models must not contain blank names");
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_sec.map(Duration::from_secs)
    }

    /// Picks the model for this run: the requested one, then the file's
    /// `model`, then the first entry of `models`.
    pub fn select_model(&self, requested: Option<&str>) -> anyhow::Result<Option<String>> {
        let selected = requested
            .map(str::to_string)
            .or_else(|| self.model.clone())
            .or_else(|| self.models.as_ref().and_then(|models| models.first().cloned()));

        if let (Some(model), Some(models)) = (&selected, &self.models) {
            if !models.iter().any(|allowed| allowed == model) {
                bail!(
                    "Model '{model}' is not listed in the config file. Available models: {}",
                    models.join(", ")
                );
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_full_file() {
        let config = ExecConfig::parse(
            r#"{
                "provider": "codex-api",
                "models": ["gpt-a", "gpt-b"],
                "api_key": "sk-test",
                "timeout_sec": 30,
                "sandbox": "read-only",
                "approval": "never"
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.provider.as_deref(), Some("codex-api"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.select_model(None).expect("model"), Some("gpt-a".to_string()));
        assert_eq!(
            config.select_model(Some("gpt-b")).expect("model"),
            Some("gpt-b".to_string())
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = ExecConfig::parse(r#"{"providr": "mock"}"#).expect_err("typo");
        assert!(error.to_string().contains("unknown field"), "{error}");
    }

    #[test]
    fn rejects_zero_timeout_and_empty_models() {
        let error = ExecConfig::parse(r#"{"timeout_sec": 0}"#).expect_err("zero timeout");
        assert_eq!(error.to_string(), "timeout_sec must be greater than zero");

        let error = ExecConfig::parse(r#"{"models": []}"#).expect_err("empty models");
        assert_eq!(error.to_string(), "models must not be empty");
    }

    #[test]
    fn requested_models_must_be_listed() {
        let config = ExecConfig::parse(r#"{"models": ["gpt-a"]}"#).expect("valid config");
        let error = config.select_model(Some("gpt-z")).expect_err("unlisted model");
        assert!(error.to_string().contains("Available models: gpt-a"));
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("exec.json");
        std::fs::write(&path, "{not json").expect("write config");

        let error = ExecConfig::load(&path).expect_err("broken json");
        assert!(error.to_string().contains("exec.json"), "{error}");
    }
}
