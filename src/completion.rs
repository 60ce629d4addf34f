//! Generative-AI completion client and its resilient wrapper.
//!
//! Defines the [`CompletionClient`] trait and concrete implementations:
//! - **[`DisabledCompletion`]**: returns errors; used when no provider is configured.
//! - **[`OpenAiCompletion`]**: calls an OpenAI-compatible `chat/completions` endpoint.
//! - **[`ResilientCompletion`]**: wraps any client with [`retry`](crate::retry::retry).
//!
//! Non-2xx responses become [`ApiError`]s carrying the status code and the
//! upstream error envelope, so the classifier can decide retryability
//! before the retrier evaluates the failure.
//!
//! Use [`create_client`] to build the configured provider; it always
//! returns the resilient wrapper.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CompletionConfig, RetryConfig};
use crate::error::{ApiError, ErrorContext, Locale};
use crate::retry::retry;

/// Role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A single "complete chat" call.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Given a prompt, return text, sometimes unavailable.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model used when a caller does not pick one.
    fn default_model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

// ============ Disabled Provider ============

/// A no-op client that always fails.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionClient for DisabledCompletion {
    fn default_model(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        bail!("Completion provider is disabled")
    }
}

// ============ OpenAI-compatible Provider ============

/// Client for `POST {base_url}/chat/completions`.
///
/// Reads the bearer key from `OPENAI_API_KEY`.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("completion.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body("completion", status.as_u16(), &body).into());
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))?;
    Ok(content.to_string())
}

// ============ Resilient wrapper ============

/// Retries the wrapped client's calls with backoff.
pub struct ResilientCompletion {
    inner: Arc<dyn CompletionClient>,
    retry: RetryConfig,
    context: ErrorContext,
    locale: Locale,
}

impl ResilientCompletion {
    pub fn new(inner: Arc<dyn CompletionClient>, retry: RetryConfig, locale: Locale) -> Self {
        Self {
            inner,
            retry,
            context: ErrorContext::default(),
            locale,
        }
    }

    /// Copy of this wrapper that logs failures with `context`.
    pub fn with_context(&self, context: ErrorContext) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            retry: self.retry.clone(),
            context,
            locale: self.locale,
        }
    }
}

#[async_trait]
impl CompletionClient for ResilientCompletion {
    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let context = self.context.clone().with("model", request.model.clone());
        retry(&self.retry, &context, self.locale, || self.inner.complete(request)).await
    }
}

/// Build the configured provider, wrapped for retries.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledCompletion`] |
/// | `"openai"` | [`OpenAiCompletion`] |
pub fn create_client(
    config: &CompletionConfig,
    retry: &RetryConfig,
    locale: Locale,
) -> Result<ResilientCompletion> {
    let inner: Arc<dyn CompletionClient> = match config.provider.as_str() {
        "disabled" => Arc::new(DisabledCompletion),
        "openai" => Arc::new(OpenAiCompletion::new(config)?),
        other => bail!("Unknown completion provider: {}", other),
    };
    Ok(ResilientCompletion::new(inner, retry.clone(), locale))
}
