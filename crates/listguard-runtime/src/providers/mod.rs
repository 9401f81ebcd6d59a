//! LLM provider abstractions.
//!
//! The pipeline talks to language models only through [`LlmProvider`].
//! Concrete providers are created through the [`ProviderRegistry`], so a
//! missing or unknown provider is a configuration outcome rather than a
//! compile-time choice.
//!
//! ## Security
//!
//! All providers hold their keys in [`ApiCredential`], which never prints
//! the secret in `Debug` or `Display` output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry, Unresolved};
pub use secrets::{ApiCredential, KeyLookup, KeyOrigin};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Environment variable holding the OpenAI-compatible API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Key lookup for the OpenAI-compatible provider.
pub const OPENAI_API_KEY: KeyLookup = KeyLookup::new("OpenAI API key", "api_key", OPENAI_API_KEY_ENV);

/// Failure of a single model call. Never retried; the calling stage turns
/// it into a diagnostic.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request could not be sent: {0}")]
    Transport(String),

    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unreadable provider response: {0}")]
    MalformedResponse(String),

    #[error("provider rejected the API key")]
    Unauthorized,

    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Configuration for a single completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,

    pub max_tokens: u32,

    /// 0.0 for deterministic output
    pub temperature: f32,

    /// Transport timeout enforced by the provider's HTTP client
    pub timeout: Duration,

    /// Ask the provider to constrain output to a JSON object
    pub json_mode: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            json_mode: false,
        }
    }
}

/// Who a chat message is from. The pipeline only ever sends instructions
/// and the product payload; replies come back as [`CompletionResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A chat message for LLM completion.
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

/// One completion, with the provider's own accounting.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,

    pub usage: TokenUsage,

    /// Model that actually served the request
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token counts reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,

    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A chat-completions backend. The only place model calls leave the process.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap local readiness check; makes no request.
    async fn health_check(&self) -> bool;

    /// Provider name for logs and usage accounting.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_roles() {
        let wire = serde_json::to_value(vec![
            ChatMessage::system("rules"),
            ChatMessage::user("product"),
        ])
        .unwrap();
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 1200,
            completion_tokens: 300,
        };
        assert_eq!(usage.total(), 1500);
    }

    #[test]
    fn test_completion_defaults() {
        let config = CompletionConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 0.0);
        assert!(!config.json_mode);
    }
}
