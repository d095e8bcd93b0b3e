mod env_manager;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::discovery::FilterConfig;
use crate::error::{Result, UpdaterError};

pub use env_manager::{apply_env_overrides, get_env_value};

/// Main configuration struct for the application
///
/// Loaded from `config.toml`, then overridden from the environment. Every
/// section falls back to its defaults when absent from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub REST client settings
    pub github: GitHubConfig,
    /// Language model endpoint settings
    pub llm: LlmConfig,
    /// Default repository filter
    pub discovery: FilterConfig,
    /// Drafting and commit settings
    pub pipeline: PipelineConfig,
    /// Local backup store
    pub backup: BackupConfig,
    /// HTTP server settings
    pub server: ServerConfig,
}

/// GitHub REST client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL of the REST API
    pub api_base: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Value of the `User-Agent` header
    pub user_agent: String,
}

/// Which language model API the client speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Local Ollama server (`/api/generate`)
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions
    #[serde(rename = "openai")]
    OpenAi,
}

impl LlmBackend {
    /// Model used when none is configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.1:8b",
            Self::OpenAi => "gpt-3.5-turbo",
        }
    }

    /// Endpoint used when none is configured
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(UpdaterError::Config(format!("unknown LLM provider '{other}'"))),
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Language model endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API flavour
    pub provider: LlmBackend,
    /// Model name sent with every request
    pub model: String,
    /// Endpoint base URL
    pub base_url: String,
    /// Bearer key, required for OpenAI
    pub api_key: Option<String>,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Whole-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Drafting and commit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cap on the bytes of file content embedded in the analyzer prompt
    pub sample_byte_limit: usize,
    /// Reviewed READMEs shorter than this many characters are rejected
    pub min_content_length: usize,
    /// Tokens the reviewer is asked to remove
    pub placeholder_tokens: Vec<String>,
    /// Commit message for README writes
    pub commit_message: String,
    /// Prefix of branches created for pull requests
    pub pull_request_branch_prefix: String,
    /// Path of the README inside the repository
    pub readme_path: String,
}

/// Local backup store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding one file per backup record
    pub dir: PathBuf,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| UpdaterError::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("readme-updater").join("config.toml"))
    }

    /// Loads configuration from `path`, or the default location when `None`
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// afterwards and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = Self::from_file(&config_path)?;
        apply_env_overrides(&mut config, get_env_value)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file without applying environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| UpdaterError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| UpdaterError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Checks URLs, timeouts and credentials
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.github.api_base)
            .map_err(|e| UpdaterError::Config(format!("invalid github.api_base: {}", e)))?;
        Url::parse(&self.llm.base_url)
            .map_err(|e| UpdaterError::Config(format!("invalid llm.base_url: {}", e)))?;

        if self.github.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(UpdaterError::Config("timeouts must be greater than zero".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(UpdaterError::Config("llm.model must not be empty".into()));
        }
        if self.pipeline.min_content_length == 0 {
            return Err(UpdaterError::Config(
                "pipeline.min_content_length must be greater than zero".into(),
            ));
        }
        if self.llm.provider == LlmBackend::OpenAi
            && self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(UpdaterError::Config(
                "the openai provider requires OPENAI_API_KEY or llm.api_key".into(),
            ));
        }
        Ok(())
    }

    /// Creates the backup directory if missing
    pub async fn ensure_directories_exist(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.backup.dir).await? {
            tokio::fs::create_dir_all(&self.backup.dir).await?;
        }
        Ok(())
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 30,
            user_agent: concat!("readme-updater/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        let provider = LlmBackend::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            api_key: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
            max_tokens: 4096,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_byte_limit: 24_000,
            min_content_length: 200,
            placeholder_tokens: vec!["Unknown".into(), "TODO".into(), "Lorem ipsum".into()],
            commit_message: "Update README.md".to_string(),
            pull_request_branch_prefix: "readme-update".to_string(),
            readme_path: "README.md".to_string(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backups"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}
