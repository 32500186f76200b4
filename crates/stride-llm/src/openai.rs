//! OpenAI-compatible chat-completions gateway
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol and
//! accepts `image_url` content parts with `data:` URLs.

use crate::error::GatewayError;
use crate::gateway::{ModelGateway, ModelRequest, UserContent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Default API base
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default vision-capable model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Connection settings for [`OpenAiGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL without trailing slash
    pub api_base: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Client-level request timeout
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Gateway backed by an OpenAI-compatible HTTP API
#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl OpenAiGateway {
    /// Create gateway
    ///
    /// # Errors
    /// - `GatewayError::MissingApiKey` if no key is configured
    /// - `GatewayError::Transport` if the HTTP client cannot be built
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(GatewayError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    /// Build the JSON body for a request
    #[must_use]
    pub fn build_body(model: &str, request: &ModelRequest) -> Value {
        let mut messages = Vec::with_capacity(2);

        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }

        let user_content = match &request.content {
            UserContent::Text(text) => json!(text),
            UserContent::TextWithImage { text, image } => json!([
                {"type": "text", "text": text},
                {"type": "image_url", "image_url": {"url": image.data_url()}},
            ]),
        };
        messages.push(json!({"role": "user", "content": user_content}));

        json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        })
    }

    /// Pull the reply text out of a response body
    ///
    /// # Errors
    /// - `GatewayError::InvalidResponse` if the envelope does not decode
    /// - `GatewayError::EmptyResponse` if there is no non-blank content
    pub fn extract_content(body: &str) -> Result<String, GatewayError> {
        let response: CompletionResponse = serde_json::from_str(body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GatewayError::EmptyResponse)
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn invoke(&self, request: ModelRequest) -> Result<String, GatewayError> {
        let body = Self::build_body(&self.config.model, &request);
        tracing::debug!(
            model = %self.config.model,
            max_tokens = request.max_tokens,
            with_image = request.content.image().is_some(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.config.request_timeout)
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Self::extract_content(&text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
