//! LLM client abstraction and implementations.
//!
//! Defines the [`LlmClient`] trait and concrete implementations:
//! - **[`DisabledClient`]**: always errors; used when no provider is configured.
//! - **[`OpenAiClient`]**: calls an OpenAI-compatible chat completions API
//!   in JSON mode, with retry and backoff.
//!
//! Use [`create_client`] to build the one selected by `[llm].provider`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// A model that answers a system + user prompt with a JSON object.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, or `"disabled"`.
    fn model_name(&self) -> &str;

    /// Send one completion request. The answer is guaranteed to be a JSON
    /// object; nothing else about its shape is checked.
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<Value>;
}

/// Build the client selected by `config.provider`.
///
/// ```rust
/// # use policy_sim::config::LlmConfig;
/// # use policy_sim::llm::create_client;
/// let client = create_client(&LlmConfig::default()).unwrap();
/// assert_eq!(client.model_name(), "disabled");
/// ```
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient::default())),
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Placeholder used when `[llm].provider = "disabled"`, or when the
/// configured provider could not be constructed.
pub struct DisabledClient {
    reason: String,
}

impl DisabledClient {
    /// A client that fails every call with `reason`.
    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DisabledClient {
    fn default() -> Self {
        Self::because(
            "LLM is disabled. Set [llm] provider = \"openai\" in config to analyze and simulate.",
        )
    }
}

#[async_trait]
impl LlmClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete_json(&self, _system: &str, _prompt: &str) -> Result<Value> {
        bail!("{}", self.reason)
    }
}

/// Chat completions client for OpenAI and compatible endpoints.
///
/// Requires `OPENAI_API_KEY` unless constructed with [`OpenAiClient::with_api_key`].
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f64,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, system: &str, prompt: &str) -> Result<Value> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        debug!(model = %self.model, attempt, "chat completion succeeded");
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%status, attempt, "LLM request failed; retrying");
                        last_err = Some(anyhow::anyhow!("LLM API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("LLM API error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "LLM request failed; retrying");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("LLM request failed after retries")))
    }
}

/// Pull `choices[0].message.content` out of a chat completion and parse it
/// as a JSON object.
pub fn parse_chat_response(json: &Value) -> Result<Value> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid LLM response: missing message content"))?;
    parse_json_object(content)
}

/// Parse model output, requiring a JSON object.
pub fn parse_json_object(content: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| anyhow::anyhow!("LLM output is not valid JSON: {}", e))?;
    if !value.is_object() {
        bail!("LLM output is not a JSON object");
    }
    Ok(value)
}
