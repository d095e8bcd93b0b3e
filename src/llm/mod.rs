//! Language model access behind a narrow text-in, text-out seam.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub use client::LlmClient;

/// One non-streaming completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full prompt text
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Overrides the configured token limit
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request with the configured token limit
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens: None,
        }
    }

    /// Caps the number of generated tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Result of a provider connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Provider name
    pub provider: String,
    /// Configured model
    pub model: String,
    /// Whether the endpoint answered
    pub reachable: bool,
    /// Models the endpoint reports
    pub models: Vec<String>,
    /// Failure description when unreachable
    pub error: Option<String>,
}

/// A text completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends the prompt and waits for the full response text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Human readable `provider/model` label
    fn describe(&self) -> String;

    /// Checks that the endpoint is reachable and lists its models
    async fn health(&self) -> ProviderHealth;
}
