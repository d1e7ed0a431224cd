//! Embedding provider implementations

mod cached;
mod ollama;

pub use cached::CachedEmbedder;
pub use ollama::OllamaEmbedder;
