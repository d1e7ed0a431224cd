//! Ollama embedding provider implementation

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;
use crate::infrastructure::http_client::{HttpClientTrait, HttpError};

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Ollama `/api/embed` client
///
/// Large inputs are sent in sub-batches of `batch_size`; each request is
/// retried with exponential backoff before the failure is surfaced.
#[derive(Debug)]
pub struct OllamaEmbedder<C: HttpClientTrait> {
    client: C,
    base_url: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl<C: HttpClientTrait> OllamaEmbedder<C> {
    pub fn new(client: C, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: model.into(),
            dimensions,
            batch_size: 32,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }

    async fn post_with_retry(&self, body: &serde_json::Value) -> Result<serde_json::Value, HttpError> {
        let url = self.embed_url();
        let mut attempt = 0;

        loop {
            match self
                .client
                .post_json(&url, vec![("Content-Type", "application/json")], body)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if attempt + 1 < self.max_attempts => {
                    let wait = self.retry_backoff * 2u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self.post_with_retry(&body).await.map_err(|e| {
            DomainError::embedding(format!(
                "Embedding request failed after {} attempt(s): {}",
                self.max_attempts, e
            ))
        })?;

        let response: OllamaEmbedResponse = serde_json::from_value(response)
            .map_err(|e| DomainError::embedding(format!("Failed to parse embedding response: {}", e)))?;

        if response.embeddings.len() != texts.len() {
            return Err(DomainError::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        if let Some(bad) = response
            .embeddings
            .iter()
            .find(|v| v.len() != self.dimensions)
        {
            return Err(DomainError::embedding(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimensions,
                bad.len()
            )));
        }

        Ok(response.embeddings)
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OllamaEmbedder<C> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let total_batches = texts.len().div_ceil(self.batch_size);
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch, chunk) in texts.chunks(self.batch_size).enumerate() {
            if total_batches > 1 {
                info!(
                    batch = batch + 1,
                    total_batches,
                    texts = chunk.len(),
                    "Embedding batch"
                );
            }
            vectors.extend(self.embed_chunk(chunk).await?);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
