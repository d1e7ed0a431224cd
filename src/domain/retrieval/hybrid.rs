//! Hybrid retriever - vector and graph branches joined by rank fusion

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use metrics::counter;
use tracing::{debug, warn};

use super::fusion::{merge_fused, reciprocal_rank_fusion};
use super::result::{FusedResult, RetrievalResult, RetrievalSource};
use super::store::{GraphStore, VectorStore};
use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;

/// Retrieval tuning
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates requested from the vector store per sub-question
    pub vector_top_k: usize,
    /// Graph traversal depth
    pub graph_hops: u32,
    /// Maximum seed entities taken from the question
    pub graph_seed_limit: usize,
    pub rrf_k: f64,
    /// Post-fusion truncation per sub-question
    pub final_top_n: usize,
    /// Sub-questions retrieved concurrently
    pub max_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 20,
            graph_hops: 2,
            graph_seed_limit: 5,
            rrf_k: super::fusion::DEFAULT_RRF_K,
            final_top_n: 10,
            max_concurrency: 4,
        }
    }
}

/// Fused candidates plus the sources that were unavailable
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub results: Vec<FusedResult>,
    pub degraded: Vec<RetrievalSource>,
}

pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    graph_store: Arc<dyn GraphStore>,
    config: RetrievalConfig,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("embedder", &self.embedder.provider_name())
            .field("config", &self.config)
            .finish()
    }
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<dyn GraphStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            graph_store,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve every sub-question with bounded concurrency and union the
    /// fused lists. Any sub-question with both sources down fails the call.
    pub async fn retrieve_all(
        &self,
        questions: &[String],
        top_n: usize,
    ) -> Result<RetrievalOutcome, DomainError> {
        let outcomes: Vec<RetrievalOutcome> = stream::iter(questions)
            .map(|question| self.retrieve(question, top_n))
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;

        let mut degraded: Vec<RetrievalSource> = Vec::new();
        let mut batches = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            for source in outcome.degraded {
                if !degraded.contains(&source) {
                    degraded.push(source);
                }
            }
            batches.push(outcome.results);
        }

        Ok(RetrievalOutcome {
            results: merge_fused(batches),
            degraded,
        })
    }

    /// Run both branches concurrently and fuse them; one failing branch
    /// degrades to the other. At most `min(top_n, final_top_n)` results.
    pub async fn retrieve(
        &self,
        question: &str,
        top_n: usize,
    ) -> Result<RetrievalOutcome, DomainError> {
        let (vector, graph) = tokio::join!(self.vector_branch(question), self.graph_branch(question));

        let (lists, degraded) = match (vector, graph) {
            (Ok(vector), Ok(graph)) => (vec![vector, graph], vec![]),
            (Ok(vector), Err(e)) => {
                degrade(RetrievalSource::Graph, &e);
                (vec![vector], vec![RetrievalSource::Graph])
            }
            (Err(e), Ok(graph)) => {
                degrade(RetrievalSource::Vector, &e);
                (vec![graph], vec![RetrievalSource::Vector])
            }
            (Err(vector_error), Err(graph_error)) => {
                return Err(DomainError::retrieval_unavailable(format!(
                    "vector: {}; graph: {}",
                    vector_error, graph_error
                )));
            }
        };

        let limit = top_n.min(self.config.final_top_n);
        let results = reciprocal_rank_fusion(&lists, self.config.rrf_k, limit);
        debug!(
            question,
            fused = results.len(),
            degraded = degraded.len(),
            "Hybrid retrieval complete"
        );

        Ok(RetrievalOutcome { results, degraded })
    }

    async fn vector_branch(&self, question: &str) -> Result<Vec<RetrievalResult>, DomainError> {
        let embedding = self.embedder.embed(question).await?;
        let hits = self
            .vector_store
            .search(&embedding, self.config.vector_top_k)
            .await?;

        Ok(hits.into_iter().map(|hit| hit.into_result()).collect())
    }

    async fn graph_branch(&self, question: &str) -> Result<Vec<RetrievalResult>, DomainError> {
        let seeds = self
            .graph_store
            .find_entities(question, self.config.graph_seed_limit)
            .await?;
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let nodes = self
            .graph_store
            .expand(&seeds, self.config.graph_hops)
            .await?;

        Ok(nodes.into_iter().map(|node| node.into_result()).collect())
    }
}

fn degrade(source: RetrievalSource, error: &DomainError) {
    counter!("graphmind_retrieval_degraded_total", "source" => source.as_str()).increment(1);
    warn!(source = %source, error = %error, "Retrieval source unavailable, continuing degraded");
}
