//! OpenAI-compatible LLM client (C2).
//!
//! Works against the OpenAI API or any OpenAI-compatible chat-completions
//! endpoint (configurable `api_base`).

use crate::llm::client::{
    ChatMessage, CompletionOptions, FinishReason, LLMClient, LLMResponse, Role, TextDeltaStream,
    TokenUsage,
};
use crate::types::{AppError, Result};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;

/// OpenAI (or OpenAI-compatible) client.
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
    context_window: u32,
}

impl OpenAIClient {
    /// Construct a client against `api_base` with `api_key`.
    pub fn new(api_key: String, api_base: String, model: String, context_window: u32) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            client: Client::with_config(config),
            model,
            context_window,
        }
    }

    fn to_request_messages(messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.as_str())
                    .build()
                    .map(ChatCompletionRequestMessage::System)
                    .map_err(|e| AppError::ProviderUnavailable(format!("build system message: {e}"))),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.as_str())
                    .build()
                    .map(ChatCompletionRequestMessage::User)
                    .map_err(|e| AppError::ProviderUnavailable(format!("build user message: {e}"))),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.as_str())
                    .build()
                    .map(ChatCompletionRequestMessage::Assistant)
                    .map_err(|e| {
                        AppError::ProviderUnavailable(format!("build assistant message: {e}"))
                    }),
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest> {
        let request_messages = Self::to_request_messages(messages)?;
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model);
        builder.messages(request_messages);
        builder.temperature(options.temperature);
        builder.max_completion_tokens(options.max_tokens);
        builder.top_p(options.top_p);
        if !options.stop_sequences.is_empty() {
            builder.stop(options.stop_sequences.clone());
        }
        builder
            .build()
            .map_err(|e| AppError::ProviderUnavailable(format!("build request: {e}")))
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, options)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            AppError::ProviderUnavailable(format!("OpenAI chat completion failed: {e}"))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ProviderUnavailable("OpenAI returned no choices".into()))?;

        let finish_reason = match choice.finish_reason.map(|r| r.to_string()) {
            Some(r) if r == "length" => FinishReason::Length,
            Some(r) if r == "content_filter" => {
                return Err(AppError::ContentFiltered(
                    "OpenAI withheld output via content filter".into(),
                ))
            }
            _ => FinishReason::Stop,
        };

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason,
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TextDeltaStream> {
        let request = self.build_request(messages, options)?;

        let mut upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("OpenAI stream failed: {e}")))?;

        let out = async_stream::stream! {
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    yield Ok(content);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(AppError::ProviderUnavailable(format!(
                            "OpenAI stream error: {e}"
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

    fn supports_function_calling(&self) -> bool {
        true
    }
}
