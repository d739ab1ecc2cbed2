//! Chat completion boundary.
//!
//! The escalator talks to models only through [`CompletionClient`], whose
//! [`complete`](CompletionClient::complete) returns a tagged
//! [`CompletionOutcome`] instead of raw text, so a rate limit is a variant
//! rather than a marker to search for.
//!
//! [`OpenAiClient`] implements the trait against an OpenAI-compatible
//! `/chat/completions` endpoint:
//!
//! - HTTP 200 → [`CompletionOutcome::Success`] with `choices[0].message.content`
//! - HTTP 429 → [`CompletionOutcome::RateLimited`]
//! - any other status → [`CompletionOutcome::Failed`]
//! - network error or timeout → [`CompletionOutcome::Transport`]
//!
//! Requests are not retried here; retry policy belongs to the escalator.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::models::Message;

/// Result of one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Success(String),
    /// The service rejected the request as too large or too frequent.
    RateLimited(String),
    /// The request never produced an HTTP response.
    Transport(String),
    /// Any other API or decoding error.
    Failed(String),
}

impl CompletionOutcome {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CompletionOutcome::RateLimited(_))
    }

    /// Text shown to the user for this outcome. Errors are reported verbatim.
    pub fn into_text(self) -> String {
        match self {
            CompletionOutcome::Success(text) => text,
            CompletionOutcome::RateLimited(body) => format!("API Error (429): {}", body),
            CompletionOutcome::Transport(e) => format!("Request error: {}", e),
            CompletionOutcome::Failed(e) => e,
        }
    }
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Message], model: &str) -> CompletionOutcome;
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiClient {
    /// Build a client from configuration. A missing API key is not an error
    /// here; each call then reports it as a failed outcome.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], model: &str) -> CompletionOutcome {
        let Some(api_key) = &self.api_key else {
            return CompletionOutcome::Failed(format!(
                "API Error: The environment variable '{}' is not defined.",
                self.api_key_env
            ));
        };

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "response_format": { "type": "text" },
        });
        debug!("POST {} model={} messages={}", self.endpoint, model, messages.len());

        let response = match self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("completion request failed: {}", e);
                return CompletionOutcome::Transport(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return CompletionOutcome::Transport(e.to_string()),
        };
        classify_response(status, &text)
    }
}

/// Map a raw HTTP status and body to an outcome.
pub fn classify_response(status: u16, body: &str) -> CompletionOutcome {
    match status {
        200 => match parse_completion(body) {
            Ok(content) => CompletionOutcome::Success(content),
            Err(e) => CompletionOutcome::Failed(format!("Invalid completion response: {}", e)),
        },
        429 => {
            warn!("completion rate limited");
            CompletionOutcome::RateLimited(body.to_string())
        }
        other => CompletionOutcome::Failed(format!("API Error ({}): {}", other, body)),
    }
}

/// Extract `choices[0].message.content` from a completion response body.
fn parse_completion(body: &str) -> Result<String> {
    let json: serde_json::Value = serde_json::from_str(body)?;
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing choices[0].message.content"))
}
