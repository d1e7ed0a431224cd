//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

/// Trait for embedding backends (Ollama, OpenAI-compatible, ...)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Embed a batch of texts; output order matches input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| DomainError::embedding("Embedding backend returned no vectors"))
    }

    /// Fixed dimension of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}
