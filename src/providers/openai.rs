//! OpenAI-compatible chat completion provider.
//!
//! Works against any endpoint that speaks the OpenAI Chat Completions wire
//! format; the built-in presets point at OpenRouter.
//!
//! # Example
//!
//! ```rust,ignore
//! use psybot::config::ProviderConfig;
//! use psybot::providers::{openai::OpenAIProvider, ChatMessage, ChatOptions, CompletionProvider};
//!
//! async fn example() {
//!     let provider = OpenAIProvider::from_config("openrouter", &ProviderConfig::default()).unwrap();
//!     let completion = provider
//!         .complete(
//!             vec![ChatMessage::system("Answer briefly."), ChatMessage::user("Why do I procrastinate?")],
//!             ChatOptions::with_max_tokens(512),
//!         )
//!         .await
//!         .unwrap();
//!     println!("{}", completion.content);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};

use super::{ChatMessage, ChatOptions, Completion, CompletionProvider, Usage};

// ============================================================================
// Wire Types
// ============================================================================

/// Request body.
#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Response body. OpenRouter sometimes reports failures inside a 200, so
/// `error` is checked before `choices`.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAIError {
    /// Numeric code carried in the body, if it looks like an HTTP status.
    fn status(&self) -> Option<u16> {
        self.code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .filter(|c| (400..600).contains(c))
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Provider for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAIProvider {
    name: String,
    api_key: Option<String>,
    api_base: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl OpenAIProvider {
    /// Build a provider from its config entry. The HTTP client carries the
    /// entry's timeout for the whole request.
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::with_client(name, config, client))
    }

    /// Build a provider around an existing client.
    pub fn with_client(name: &str, config: &ProviderConfig, client: Client) -> Self {
        Self {
            name: name.to_string(),
            api_key: config.api_key().map(str::to_string),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        }
    }

    /// Completion token cap used when the caller does not pass one.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

fn parse_completion(response: OpenAIResponse) -> std::result::Result<Completion, ProviderError> {
    if let Some(error) = response.error {
        return Err(ProviderError::Api {
            status: error.status().unwrap_or(502),
            message: error.message,
        });
    }

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "completion content is empty".to_string(),
        ));
    }

    Ok(Completion {
        content,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty error body".to_string(),
        Err(_) => crate::utils::string::preview(body.trim(), 200),
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> std::result::Result<Completion, ProviderError> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: options.max_tokens.or(Some(self.max_tokens)),
        };

        debug!(provider = %self.name, model = %self.model, "sending completion request");

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            warn!(provider = %self.name, status = status.as_u16(), error = %message, "completion request rejected");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("undecodable body: {}", e)))?;
        parse_completion(parsed)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Tests
// ============================================================================
