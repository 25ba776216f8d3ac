//! LLM provider clients and abstractions (C2).
//!
//! The rest of the application talks to exactly one [`LLMClient`] trait
//! object, selected once at startup via [`Provider::create_client`].
//!
//! # Supported providers
//!
//! Enable providers via Cargo features:
//! - `openai` - OpenAI API or an OpenAI-compatible chat-completions endpoint
//! - `ollama` - Local Ollama server
//!
//! # Streaming
//!
//! Every provider supports streaming via [`LLMClient::stream`], which
//! returns a [`TextDeltaStream`] of incremental text deltas.

/// Core LLM client trait and streaming response types.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{
    ChatMessage, CompletionOptions, FinishReason, LLMClient, LLMResponse, Provider, Role,
    TextDeltaStream, TokenUsage,
};
