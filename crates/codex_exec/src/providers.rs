use std::sync::Arc;
use std::time::Duration;

use agent_provider::RunProvider;
use agent_provider_codex_api::{CodexApiProvider, CodexApiProviderConfig, CODEX_API_PROVIDER_ID};
use agent_provider_mock::{MockProvider, MOCK_PROVIDER_ID};

pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Backend settings gathered from flags, the config file, and the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

pub fn provider_for_id(
    provider_id: &str,
    settings: &ProviderSettings,
) -> Result<Arc<dyn RunProvider>, String> {
    match provider_id {
        MOCK_PROVIDER_ID => {
            let provider = match &settings.model {
                Some(model) => MockProvider::new().with_model_id(model.clone()),
                None => MockProvider::new(),
            };
            Ok(Arc::new(provider))
        }
        CODEX_API_PROVIDER_ID => {
            let api_key = settings
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    format!(
                        "Provider '{CODEX_API_PROVIDER_ID}' needs an api_key in the config file or {API_KEY_ENV_VAR}"
                    )
                })?;

            let mut config = CodexApiProviderConfig::new(api_key);
            if let Some(model) = &settings.model {
                config = config.with_model(model.clone());
            }
            if let Some(base_url) = &settings.base_url {
                config = config.with_base_url(base_url.clone());
            }
            if let Some(timeout) = settings.timeout {
                config = config.with_timeout(timeout);
            }
            if let Some(max_retries) = settings.max_retries {
                config = config.with_max_retries(max_retries);
            }

            let provider = CodexApiProvider::new(config).map_err(|error| error.to_string())?;
            Ok(Arc::new(provider))
        }
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {CODEX_API_PROVIDER_ID}"
        )),
    }
}
