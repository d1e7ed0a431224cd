use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};

use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;

/// Embedding provider wrapper with a bounded LRU cache
#[derive(Debug)]
pub struct CachedEmbedder<E: EmbeddingProvider> {
    inner: E,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl<E: EmbeddingProvider> CachedEmbedder<E> {
    pub fn new(inner: E, capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(capacity).build();

        Self { inner, cache }
    }

    pub fn cache_size(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn cache_key(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<E> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let keys: Vec<String> = texts.iter().map(|t| Self::cache_key(t)).collect();
        let mut found: HashMap<String, Arc<Vec<f32>>> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        let mut miss_keys: Vec<String> = Vec::new();

        for (text, key) in texts.iter().zip(&keys) {
            if found.contains_key(key) || miss_keys.contains(key) {
                continue;
            }
            match self.cache.get(key).await {
                Some(vector) => {
                    found.insert(key.clone(), vector);
                }
                None => {
                    misses.push(text.clone());
                    miss_keys.push(key.clone());
                }
            }
        }

        tracing::debug!(
            provider = self.inner.provider_name(),
            hits = found.len(),
            misses = misses.len(),
            "Embedding cache lookup"
        );

        if !misses.is_empty() {
            let vectors = self.inner.embed_batch(&misses).await?;
            if vectors.len() != misses.len() {
                return Err(DomainError::embedding(format!(
                    "Expected {} embeddings, got {}",
                    misses.len(),
                    vectors.len()
                )));
            }

            for (key, vector) in miss_keys.into_iter().zip(vectors) {
                let vector = Arc::new(vector);
                self.cache.insert(key.clone(), Arc::clone(&vector)).await;
                found.insert(key, vector);
            }
        }

        keys.iter()
            .map(|key| {
                found
                    .get(key)
                    .map(|v| v.as_ref().clone())
                    .ok_or_else(|| DomainError::internal("Embedding missing after cache fill"))
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let embedder = CachedEmbedder::new(MockEmbeddingProvider::new(16), 100);

        let first = embedder.embed("graph databases").await.unwrap();
        let second = embedder.embed("graph databases").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.inner().batch_count(), 1);
    }

    #[tokio::test]
    async fn test_only_misses_are_embedded_and_order_kept() {
        let embedder = CachedEmbedder::new(MockEmbeddingProvider::new(16), 100);
        embedder.embed("alpha").await.unwrap();

        let texts = strings(&["beta", "alpha", "gamma", "beta"]);
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 4);
        assert_eq!(vectors[0], vectors[3]);
        assert_eq!(vectors[1], embedder.inner().vector_for("alpha"));
        assert_eq!(vectors[2], embedder.inner().vector_for("gamma"));
        // "alpha" once, then "beta" and "gamma" together
        assert_eq!(embedder.inner().text_count(), 3);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let embedder = CachedEmbedder::new(MockEmbeddingProvider::new(16).with_error("down"), 100);

        assert!(embedder.embed("alpha").await.is_err());
        assert!(embedder.embed("alpha").await.is_err());
        assert_eq!(embedder.inner().batch_count(), 2);
    }
}
