//! LLM client abstraction (C2).
//!
//! All providers implement [`LLMClient`]: a synchronous `complete` for batch
//! precomputation (comparisons) and a `stream` for user-facing chat. Provider
//! selection happens once at startup via [`Provider::create_client`]; nothing
//! here supports runtime reconfiguration.

use crate::types::{AppError, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Role of a message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions, not attributable to the end user.
    System,
    /// The end user's message.
    User,
    /// A prior model response, for multi-turn context.
    Assistant,
}

/// One message in an ordered conversation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Construct a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Construct a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Construct an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling/decoding options for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Sampling temperature (default 0.7, per spec §4.13).
    pub temperature: f32,
    /// Maximum output tokens (default 1,000, per spec §4.13).
    pub max_tokens: u32,
    /// Stop sequences; generation halts on first match.
    pub stop_sequences: Vec<String>,
    /// Nucleus sampling parameter.
    pub top_p: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1_000,
            stop_sequences: Vec::new(),
            top_p: 1.0,
        }
    }
}

/// Token accounting for a completion call.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the generated completion.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens billed for this call.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model completed its response naturally or hit a stop sequence.
    Stop,
    /// The model stopped because `max_tokens` was reached.
    Length,
    /// Output was withheld by a content filter.
    ContentFiltered,
}

/// Result of a non-streaming completion call.
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// Generated text.
    pub content: String,
    /// Token accounting.
    pub usage: TokenUsage,
    /// Stop reason.
    pub finish_reason: FinishReason,
}

/// A lazy, finite sequence of text deltas from a streaming completion.
/// Terminal completion of the stream indicates success; an `Err` item
/// signals an abrupt failure and ends the sequence.
pub type TextDeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Capability trait every LLM provider implements (C2).
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Synchronous completion over an ordered message list.
    ///
    /// # Errors
    /// `ProviderUnavailable` on transport error, `ContextOverflow` if the
    /// combined prompt exceeds `context_window()`, `ContentFiltered` if the
    /// provider withholds output.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LLMResponse>;

    /// Streaming completion; each item is an incremental text delta.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TextDeltaStream>;

    /// Maximum context window in tokens.
    fn context_window(&self) -> u32;

    /// Provider-reported model identifier.
    fn model_name(&self) -> &str;

    /// Whether this provider can accept function/tool-calling schemas.
    /// The RAG core never exercises this, but providers report it honestly.
    fn supports_function_calling(&self) -> bool {
        false
    }
}

/// Config-driven provider selection, mirroring one enum + factory pattern:
/// no runtime reconfiguration, one value constructed at startup per §9.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API or an OpenAI-compatible endpoint.
    OpenAI {
        /// API key.
        api_key: String,
        /// Base URL, e.g. `https://api.openai.com/v1`.
        api_base: String,
        /// Model identifier, e.g. `gpt-4o-mini`.
        model: String,
        /// Context window in tokens, since the API does not report it.
        context_window: u32,
    },
    /// Local Ollama server.
    Ollama {
        /// Base URL, e.g. `http://localhost:11434`.
        base_url: String,
        /// Model tag, e.g. `llama3.2:3b`.
        model: String,
        /// Context window in tokens.
        context_window: u32,
    },
}

impl Provider {
    /// Construct the concrete client for this provider.
    pub async fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                context_window,
            } => Ok(Box::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
                *context_window,
            ))),
            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { .. } => Err(AppError::Configuration(
                "OpenAI provider selected but the `openai` feature is disabled".into(),
            )),

            #[cfg(feature = "ollama")]
            Provider::Ollama {
                base_url,
                model,
                context_window,
            } => Ok(Box::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone(), *context_window)
                    .await?,
            )),
            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama provider selected but the `ollama` feature is disabled".into(),
            )),
        }
    }

    /// Human-readable provider name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "openai",
            Provider::Ollama { .. } => "ollama",
        }
    }

    /// Build a provider from `LLM_PROVIDER` + friends (see spec §6).
    pub fn from_env() -> Result<Self> {
        let kind = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string());
        match kind.as_str() {
            "openai" => Ok(Provider::OpenAI {
                api_key: std::env::var("OPENAI_API_KEY").map_err(|_| {
                    AppError::Configuration("OPENAI_API_KEY is required for LLM_PROVIDER=openai".into())
                })?,
                api_base: std::env::var("OPENAI_API_BASE")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                context_window: std::env::var("OPENAI_CONTEXT_WINDOW")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(128_000),
            }),
            "ollama" => Ok(Provider::Ollama {
                base_url: std::env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string()),
                context_window: std::env::var("OLLAMA_CONTEXT_WINDOW")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8_192),
            }),
            other => Err(AppError::Configuration(format!(
                "Unknown LLM_PROVIDER '{}'; expected 'openai' or 'ollama'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names() {
        let openai = Provider::OpenAI {
            api_key: "k".into(),
            api_base: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            context_window: 128_000,
        };
        assert_eq!(openai.name(), "openai");

        let ollama = Provider::Ollama {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            context_window: 8_192,
        };
        assert_eq!(ollama.name(), "ollama");
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }
}
