use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{CompletionRequest, LlmProvider, ProviderHealth};
use crate::config::{LlmBackend, LlmConfig};
use crate::error::{LlmError, Result, UpdaterError};

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// HTTP client for Ollama and OpenAI-compatible endpoints
pub struct LlmClient {
    client: Client,
    backend: LlmBackend,
    model: String,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| UpdaterError::Network(e.to_string()))?;

        Ok(Self {
            client,
            backend: config.provider,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            max_tokens: config.max_tokens,
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout {
                secs: self.timeout_secs,
            }
        } else if error.is_decode() {
            LlmError::InvalidResponse(error.to_string())
        } else {
            LlmError::Connection(error.to_string())
        }
    }

    async fn checked(&self, response: Response) -> std::result::Result<Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(LlmError::Provider {
            status: status.as_u16(),
            message: message.chars().take(500).collect(),
        })
    }

    async fn generate_ollama(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "top_p": 0.9,
                "num_predict": request.max_tokens.unwrap_or(self.max_tokens),
            }
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let parsed: OllamaResponse = self
            .checked(response)
            .await?
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(parsed.response)
    }

    async fn generate_openai(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatResponse = self
            .checked(response)
            .await?
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, LlmError> {
        match self.backend {
            LlmBackend::Ollama => {
                let response = self
                    .client
                    .get(format!("{}/api/tags", self.base_url))
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await
                    .map_err(|e| self.transport_error(e))?;
                let tags: OllamaTags = self
                    .checked(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| self.transport_error(e))?;
                Ok(tags.models.into_iter().map(|m| m.name).collect())
            }
            LlmBackend::OpenAi => {
                let mut builder = self
                    .client
                    .get(format!("{}/models", self.base_url))
                    .timeout(Duration::from_secs(5));
                if let Some(key) = &self.api_key {
                    builder = builder.bearer_auth(key);
                }
                let response = builder.send().await.map_err(|e| self.transport_error(e))?;
                let list: ModelList = self
                    .checked(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| self.transport_error(e))?;
                Ok(list.data.into_iter().map(|m| m.id).collect())
            }
        }
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError> {
        debug!(
            "Sending {} prompt characters to {}",
            request.prompt.len(),
            self.describe()
        );

        let text = match self.backend {
            LlmBackend::Ollama => self.generate_ollama(request).await?,
            LlmBackend::OpenAi => self.generate_openai(request).await?,
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.backend, self.model)
    }

    async fn health(&self) -> ProviderHealth {
        let (reachable, models, error) = match self.list_models().await {
            Ok(models) => (true, models, None),
            Err(e) => {
                warn!("LLM provider {} is unreachable: {}", self.describe(), e);
                (false, Vec::new(), Some(e.to_string()))
            }
        };

        ProviderHealth {
            provider: self.backend.to_string(),
            model: self.model.clone(),
            reachable,
            models,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config(backend: LlmBackend, base_url: String) -> LlmConfig {
        LlmConfig {
            provider: backend,
            model: backend.default_model().to_string(),
            base_url,
            api_key: Some("sk-test".to_string()),
            timeout_secs: 5,
            connect_timeout_secs: 1,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_ollama_completion() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3.1:8b",
                "stream": false,
                "options": {"num_predict": 256}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "  ## Project Type\nCLI  ", "done": true}"#)
            .create_async()
            .await;

        let client = LlmClient::new(&config(LlmBackend::Ollama, server.url())).unwrap();
        let text = client
            .complete(&CompletionRequest::new("Describe", 0.2))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(text, "## Project Type\nCLI");
    }

    #[tokio::test]
    async fn test_openai_completion_sends_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({"model": "gpt-3.5-turbo", "max_tokens": 64})))
            .with_status(200)
            .with_body(r##"{"choices": [{"message": {"role": "assistant", "content": "# Title"}}]}"##)
            .create_async()
            .await;

        let client = LlmClient::new(&config(LlmBackend::OpenAi, server.url())).unwrap();
        let text = client
            .complete(&CompletionRequest::new("Write", 0.7).with_max_tokens(64))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(text, "# Title");
    }

    #[tokio::test]
    async fn test_error_statuses_and_empty_output() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"prompt": "fail"})))
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"prompt": "blank"})))
            .with_status(200)
            .with_body(r#"{"response": "   "}"#)
            .create_async()
            .await;

        let client = LlmClient::new(&config(LlmBackend::Ollama, server.url())).unwrap();

        let failed = client.complete(&CompletionRequest::new("fail", 0.2)).await;
        assert!(matches!(failed, Err(LlmError::Provider { status: 500, .. })));

        let blank = client.complete(&CompletionRequest::new("blank", 0.2)).await;
        assert_eq!(blank, Err(LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let client = LlmClient::new(&config(LlmBackend::Ollama, "http://127.0.0.1:9".to_string())).unwrap();

        let result = client.complete(&CompletionRequest::new("hello", 0.2)).await;
        assert!(matches!(result, Err(LlmError::Connection(_))));

        let health = client.health().await;
        assert!(!health.reachable);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_health_lists_ollama_models() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "llama3.1:8b"}, {"name": "mistral"}]}"#)
            .create_async()
            .await;

        let client = LlmClient::new(&config(LlmBackend::Ollama, server.url())).unwrap();
        let health = client.health().await;

        assert!(health.reachable);
        assert_eq!(health.models, vec!["llama3.1:8b".to_string(), "mistral".to_string()]);
        assert_eq!(client.describe(), "ollama/llama3.1:8b");
    }
}
