//! Chat/completion client abstraction.
//!
//! [`ChatClient`] takes role-tagged messages, an optional model override,
//! a token budget, and an optional system instruction, and returns the
//! generated text plus [`UsageMetrics`]. Implementations:
//!
//! | Config Value | Client | Endpoint |
//! |-------------|--------|----------|
//! | `"disabled"` | [`DisabledChat`] | n/a |
//! | `"openai"` | [`OpenAiChat`] | `POST {url}/v1/chat/completions` |
//! | `"ollama"` | [`OllamaChat`] | `POST {url}/api/chat` |
//!
//! Like the embedders, each call is a single request; retries and the
//! request-level timeout are applied by [`run_with_retry`](crate::retry::run_with_retry).

pub mod extract;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::models::UsageMetrics;

const SERVICE: &str = "llm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the client's configured model.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub system: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: UsageMetrics,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

// ============ Disabled ============

pub struct DisabledChat;

#[async_trait]
impl ChatClient for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        Err(Error::external(SERVICE, "llm provider is disabled", false))
    }
}

// ============ OpenAI-compatible ============

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Client for OpenAI's chat completions API or any compatible server.
pub struct OpenAiChat {
    model: String,
    url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Self::with_endpoint(model, url, api_key, config.timeout_secs)
    }

    pub fn with_endpoint(
        model: String,
        url: String,
        api_key: String,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
            client,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = OpenAiRequest {
            model,
            messages: with_system(request),
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_transport(SERVICE, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(SERVICE, status, text));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| Error::external(SERVICE, format!("invalid response: {}", e), false))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::external(SERVICE, "response contained no choices", false))?;

        let usage = parsed.usage.map_or_else(UsageMetrics::default, |u| UsageMetrics {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            model_id: String::new(),
        });

        Ok(Completion {
            content,
            usage: UsageMetrics {
                model_id: parsed.model.unwrap_or_else(|| model.to_string()),
                ..usage
            },
        })
    }
}

// ============ Ollama ============

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

/// Client for a local Ollama instance's non-streaming chat endpoint.
pub struct OllamaChat {
    model: String,
    url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }
}

#[async_trait]
impl ChatClient for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = OllamaRequest {
            model,
            messages: with_system(request),
            stream: false,
            options: request.max_tokens.map(|n| OllamaOptions { num_predict: n }),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_transport(SERVICE, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(SERVICE, status, text));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| Error::external(SERVICE, format!("invalid response: {}", e), false))?;

        Ok(Completion {
            content: parsed.message.content,
            usage: UsageMetrics {
                prompt_tokens: parsed.prompt_eval_count,
                completion_tokens: parsed.eval_count,
                total_tokens: parsed.prompt_eval_count + parsed.eval_count,
                model_id: parsed.model.unwrap_or_else(|| model.to_string()),
            },
        })
    }
}

/// Prepend the system instruction as a `system` message.
fn with_system(request: &CompletionRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(ChatMessage::system(system.clone()));
    }
    messages.extend(request.messages.iter().cloned());
    messages
}

pub fn create_chat_client(config: &LlmConfig) -> anyhow::Result<Arc<dyn ChatClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_instruction_goes_first() {
        let request = CompletionRequest::new("hello").with_system("be terse");
        let messages = with_system(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1], ChatMessage::user("hello"));
    }

    #[test]
    fn test_no_system_instruction() {
        let request = CompletionRequest::new("hello");
        assert_eq!(with_system(&request).len(), 1);
    }
}
