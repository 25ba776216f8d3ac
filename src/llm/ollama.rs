//! Local Ollama LLM client (C2).
//!
//! Talks to a locally-running Ollama server for chat completion and
//! streaming. No tool-calling support: the RAG core never needs it, and
//! `supports_function_calling` reports `false` honestly.

use crate::llm::client::{
    ChatMessage as RagChatMessage, CompletionOptions, FinishReason, LLMClient, LLMResponse, Role,
    TextDeltaStream, TokenUsage,
};
use crate::types::{AppError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};

/// Ollama-backed client.
pub struct OllamaClient {
    client: Ollama,
    model: String,
    context_window: u32,
}

impl OllamaClient {
    /// Construct a client against `base_url`, normalizing host[:port] forms.
    ///
    /// `ollama-rs`'s `Ollama::new(host, port)` parses `host` via reqwest's
    /// `IntoUrl` and panics on a relative URL, so we normalize liberally
    /// accepted inputs (`localhost`, `localhost:11434`, `http://host:port/path`)
    /// into the scheme+host it expects.
    pub async fn new(base_url: String, model: String, context_window: u32) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(AppError::Configuration(
                "OLLAMA_BASE_URL is empty; expected e.g. http://localhost:11434".into(),
            ));
        }

        let without_scheme = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .unwrap_or(trimmed);
        let host_port = without_scheme
            .split(&['/', '?', '#'][..])
            .next()
            .unwrap_or("localhost:11434");

        let (host, port) = if let Some(colon_idx) = host_port.rfind(':') {
            let h = &host_port[..colon_idx];
            let p = host_port[colon_idx + 1..].parse::<u16>().map_err(|_| {
                AppError::Configuration(format!(
                    "invalid OLLAMA_BASE_URL port in '{}'; expected e.g. http://localhost:11434",
                    base_url
                ))
            })?;
            (h.to_string(), p)
        } else {
            (host_port.to_string(), 11434)
        };

        let client = Ollama::new(format!("http://{}", host), port);

        Ok(Self {
            client,
            model,
            context_window,
        })
    }

    fn build_model_options(options: &CompletionOptions) -> ModelOptions {
        let mut model_options = ModelOptions::default()
            .temperature(options.temperature)
            .top_p(options.top_p)
            .num_predict(options.max_tokens as i32);
        if !options.stop_sequences.is_empty() {
            model_options = model_options.stop(options.stop_sequences.clone());
        }
        model_options
    }

    fn to_ollama_messages(messages: &[RagChatMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content.clone()),
                Role::User => ChatMessage::user(m.content.clone()),
                Role::Assistant => ChatMessage::assistant(m.content.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn complete(
        &self,
        messages: &[RagChatMessage],
        options: &CompletionOptions,
    ) -> Result<LLMResponse> {
        let request = ChatMessageRequest::new(self.model.clone(), Self::to_ollama_messages(messages))
            .options(Self::build_model_options(options));

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Ollama chat failed: {e}")))?;

        let content = response.message.map(|m| m.content).unwrap_or_default();

        let usage = TokenUsage {
            prompt_tokens: response.prompt_eval_count.unwrap_or(0) as u32,
            completion_tokens: response.eval_count.unwrap_or(0) as u32,
        };

        let finish_reason = if response.done {
            FinishReason::Stop
        } else {
            FinishReason::Length
        };

        Ok(LLMResponse {
            content,
            usage,
            finish_reason,
        })
    }

    async fn stream(
        &self,
        messages: &[RagChatMessage],
        options: &CompletionOptions,
    ) -> Result<TextDeltaStream> {
        let request = ChatMessageRequest::new(self.model.clone(), Self::to_ollama_messages(messages))
            .options(Self::build_model_options(options));

        let mut upstream = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Ollama stream failed: {e}")))?;

        let out = stream! {
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(response) => {
                        if let Some(message) = response.message {
                            if !message.content.is_empty() {
                                yield Ok(message.content);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(AppError::ProviderUnavailable(format!(
                            "Ollama stream error: {e}"
                        )));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
