//! Query service: response caching in front of the orchestrator

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::domain::DomainError;
use crate::domain::agent::{AnswerStream, Orchestrator, Query, QueryResponse};
use crate::domain::routing::ProviderHealth;

/// Response cache settings
#[derive(Debug, Clone)]
pub struct QueryCacheConfig {
    pub enabled: bool,
    pub capacity: u64,
    pub ttl: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
            ttl: Duration::from_secs(300),
        }
    }
}

impl QueryCacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct QueryService {
    orchestrator: Arc<Orchestrator>,
    cache: Option<Cache<String, Arc<QueryResponse>>>,
}

impl QueryService {
    pub fn new(orchestrator: Arc<Orchestrator>, config: QueryCacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.ttl)
                .build()
        });

        Self {
            orchestrator,
            cache,
        }
    }

    /// Cache key over the normalized question, the effective engine and top_k
    pub fn cache_key(&self, query: &Query) -> String {
        let engine = query
            .engine
            .unwrap_or_else(|| self.orchestrator.default_engine());
        let normalized = query
            .question
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"|");
        hasher.update(engine.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(query.top_k.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Answer a query, serving repeated questions from the cache.
    /// Errors are never cached.
    pub async fn ask(&self, query: &Query) -> Result<QueryResponse, DomainError> {
        let Some(ref cache) = self.cache else {
            return self.orchestrator.run(query).await;
        };

        query.validate()?;
        let key = self.cache_key(query);

        if let Some(cached) = cache.get(&key).await {
            info!(query_id = %cached.query_id, "Serving cached response");
            return Ok(cached.as_ref().clone());
        }

        let response = self.orchestrator.run(query).await?;
        cache.insert(key, Arc::new(response.clone())).await;
        debug!(query_id = %response.query_id, "Cached response");

        Ok(response)
    }

    /// Streaming bypasses the cache
    pub async fn ask_stream(&self, query: &Query) -> Result<AnswerStream, DomainError> {
        self.orchestrator.stream_answer(query).await
    }

    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        self.orchestrator.router().health().await
    }

    pub async fn cached_entries(&self) -> u64 {
        match self.cache {
            Some(ref cache) => {
                cache.run_pending_tasks().await;
                cache.entry_count()
            }
            None => 0,
        }
    }

    pub async fn clear_cache(&self) {
        if let Some(ref cache) = self.cache {
            cache.invalidate_all();
            cache.run_pending_tasks().await;
        }
    }
}
