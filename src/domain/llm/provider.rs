use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use super::response::StreamChunk;
use super::{LlmRequest, LlmResponse};
use crate::domain::DomainError;

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, DomainError>> + Send>>;

/// One LLM backend (Groq, Gemini, Ollama, ...)
///
/// The provider router iterates implementations of this trait in priority
/// order; adding a backend means implementing it, never branching on names.
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Send a chat completion request
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError>;

    /// Send a streaming chat completion request
    async fn chat_stream(&self, model: &str, request: LlmRequest)
    -> Result<LlmStream, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}
