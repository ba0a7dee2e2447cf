// LLM provider implementations: Anthropic, OpenAI, and custom HTTP endpoints.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmSection;
use crate::error::{LlmError, SleuthError};

use super::{Completion, LlmProvider, TokenUsage};

const DEFAULT_MAX_TOKENS: u32 = 2048;

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        completion: &Completion<'_>,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: completion.temperature,
            system: completion.system.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: completion.prompt.to_string(),
            }],
        };

        debug!(model = %self.model, "Calling Anthropic API");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SleuthError::Llm(LlmError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(SleuthError::Llm(LlmError::ApiError { status, body: text }));
        }

        let result: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| SleuthError::Llm(LlmError::Parse(e.to_string())))?;

        let text = result
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok((
            text,
            TokenUsage {
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
            },
        ))
    }
}

// ── OpenAI Provider ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        completion: &Completion<'_>,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if !completion.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: completion.system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: completion.prompt.to_string(),
        });

        let body = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: completion.temperature,
            messages,
        };

        debug!(model = %self.model, "Calling OpenAI API");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SleuthError::Llm(LlmError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(SleuthError::Llm(LlmError::ApiError { status, body: text }));
        }

        let result: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| SleuthError::Llm(LlmError::Parse(e.to_string())))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = result.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok((text, usage))
    }
}

// ── Provider Factory ────────────────────────────────────────────────

/// Create an LLM provider by name.
pub fn create_provider(
    provider: &str,
    model: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    match provider {
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.trim_end_matches('/').to_string());
            }
            Ok(Box::new(p))
        }
        "openai" | "custom" => {
            let mut p = OpenAiProvider::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.trim_end_matches('/').to_string());
            }
            Ok(Box::new(p))
        }
        other => Err(SleuthError::Llm(LlmError::Config(format!(
            "Unknown provider: {other}. Use: anthropic, openai, custom"
        )))),
    }
}

/// Create the configured provider, reading the API key from the environment
/// and applying the request timeout and token limit.
pub fn create_provider_from_config(
    llm: &LlmSection,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    let api_key = llm.api_key().ok_or_else(|| {
        SleuthError::Llm(LlmError::Config(format!(
            "api_key not set: export {} or use --offline",
            llm.api_key_env
        )))
    })?;
    create_provider_with(llm, &api_key, llm.timeout())
}

fn create_provider_with(
    llm: &LlmSection,
    api_key: &str,
    timeout: Duration,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SleuthError::Llm(LlmError::Config(e.to_string())))?;
    let base_url = llm.base_url().map(|u| u.trim_end_matches('/').to_string());

    match llm.provider.as_str() {
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key.to_string(), llm.model.clone())
                .with_client(client)
                .with_max_tokens(llm.max_tokens);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Ok(Box::new(p))
        }
        "openai" | "custom" => {
            let mut p = OpenAiProvider::new(api_key.to_string(), llm.model.clone())
                .with_client(client)
                .with_max_tokens(llm.max_tokens);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Ok(Box::new(p))
        }
        other => create_provider(other, &llm.model, api_key, llm.base_url()),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
