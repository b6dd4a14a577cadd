//! Provider types for PsyBot
//!
//! The bot only ever sends a two-message conversation (system prompt plus the
//! user's question), so the types here are deliberately small.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatOptions {
    /// Completion token cap; provider default when `None`.
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Text of the first choice.
    pub content: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<Usage>,
}

/// A chat-completion backend.
///
/// Implementations perform exactly one request per call and never retry;
/// failures are classified into [`ProviderError`] so the caller can pick
/// the user-facing message.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion over `messages`.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<Completion, ProviderError>;

    /// Model identifier sent with requests.
    fn model(&self) -> &str;

    /// Configured provider name (e.g. `openrouter`).
    fn name(&self) -> &str;
}
