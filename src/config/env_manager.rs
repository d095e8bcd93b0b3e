use std::path::PathBuf;

use super::{Config, LlmBackend};
use crate::error::{Result, UpdaterError};

/// Reads an environment variable, treating an empty value as unset
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Applies environment overrides on top of file configuration
///
/// `lookup` is usually [`get_env_value`]; tests pass a closure over a map.
/// Selecting a different provider through `LLM_PROVIDER` resets the model and
/// base URL to that provider's defaults before the provider-specific
/// variables are read.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(provider) = lookup("LLM_PROVIDER") {
        let provider: LlmBackend = provider.parse()?;
        if provider != config.llm.provider {
            config.llm.provider = provider;
            config.llm.model = provider.default_model().to_string();
            config.llm.base_url = provider.default_base_url().to_string();
        }
    }

    let (model_key, base_key) = match config.llm.provider {
        LlmBackend::Ollama => ("OLLAMA_MODEL", "OLLAMA_BASE_URL"),
        LlmBackend::OpenAi => ("OPENAI_MODEL", "OPENAI_BASE_URL"),
    };
    if let Some(model) = lookup(model_key) {
        config.llm.model = model;
    }
    if let Some(base_url) = lookup(base_key) {
        config.llm.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(secs) = lookup("LLM_TIMEOUT_SECS") {
        config.llm.timeout_secs = secs
            .trim()
            .parse()
            .map_err(|_| UpdaterError::Config(format!("LLM_TIMEOUT_SECS is not a number: {secs}")))?;
    }

    if let Some(api_base) = lookup("GITHUB_API_BASE_URL") {
        config.github.api_base = api_base.trim_end_matches('/').to_string();
    }
    if let Some(dir) = lookup("BACKUP_DIR") {
        config.backup.dir = PathBuf::from(dir);
    }
    if let Some(bind) = lookup("BIND_ADDR") {
        config.server.bind = bind;
    }
    Ok(())
}
