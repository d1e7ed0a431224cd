//! GraphMind
//!
//! Agentic retrieval-augmented question answering:
//! - Provider cascade with per-provider circuit breakers
//! - Hybrid vector + knowledge-graph retrieval fused with RRF
//! - Plan, synthesize, evaluate and retry as an explicit state machine

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use domain::{
    EmbeddingProvider, Evaluator, GraphStore, HybridRetriever, Orchestrator, OrchestratorConfig,
    RetrievalConfig, RetryPolicy, ScoringEngine, VectorStore,
    evaluation::LlmJudgeScorer,
    retrieval::{GraphIndex, VectorIndex},
};
use infrastructure::{
    embedding::{CachedEmbedder, OllamaEmbedder},
    graph_store::{InMemoryGraphStore, Neo4jGraphStore},
    http_client::HttpClient,
    llm::LlmProviderFactory,
    services::{QueryCacheConfig, QueryService},
    vector_store::{InMemoryVectorStore, QdrantVectorStore},
};
use config::StoreBackend;
use tracing::info;

/// Wired services plus the write handles used for corpus seeding
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub graph_index: Arc<dyn GraphIndex>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("query_service", &self.query_service)
            .field("embedder", &self.embedder.provider_name())
            .finish()
    }
}

/// Create the application state with default configuration
pub fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default())
}

/// Create the application state with custom configuration
pub fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let router = Arc::new(
        LlmProviderFactory::create_router(&config.llm, &config.circuit_breaker)
            .context("Failed to configure LLM providers")?,
    );

    let embedder = create_embedder(config)?;
    let (vector_store, vector_index) = create_vector_store(config)?;
    let (graph_store, graph_index) = create_graph_store(config)?;

    let retriever = Arc::new(HybridRetriever::new(
        Arc::clone(&embedder),
        vector_store,
        graph_store,
        RetrievalConfig {
            vector_top_k: config.retrieval.vector_top_k,
            graph_hops: config.retrieval.graph_hops,
            graph_seed_limit: config.retrieval.graph_seed_limit,
            rrf_k: config.retrieval.rrf_k,
            final_top_n: config.retrieval.final_top_n,
            max_concurrency: config.retrieval.max_concurrency.max(1),
        },
    ));

    let evaluator = Evaluator::new(
        Arc::new(LlmJudgeScorer::new(Arc::clone(&router))),
        RetryPolicy {
            eval_threshold: config.agents.eval_threshold,
            max_retries: config.agents.max_retries,
        },
    );

    let default_engine: ScoringEngine = config
        .agents
        .default_engine
        .parse()
        .map_err(anyhow::Error::msg)?;

    let orchestrator = Orchestrator::new(
        router,
        retriever,
        evaluator,
        OrchestratorConfig {
            query_timeout: Duration::from_millis(config.agents.query_timeout_ms),
            max_context_documents: config.agents.max_context_documents,
            default_engine,
        },
    );

    let query_service = QueryService::new(
        Arc::new(orchestrator),
        QueryCacheConfig {
            enabled: config.cache.enabled,
            capacity: config.cache.capacity,
            ttl: Duration::from_secs(config.cache.ttl_secs),
        },
    );

    info!(
        vector_store = ?config.vector_store.provider,
        graph_store = ?config.graph_store.provider,
        engine = default_engine.as_str(),
        "GraphMind initialized"
    );

    Ok(AppState {
        query_service: Arc::new(query_service),
        embedder,
        vector_index,
        graph_index,
    })
}

fn create_embedder(config: &AppConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let settings = &config.embeddings;
    let client = HttpClient::with_timeout(Duration::from_millis(settings.timeout_ms))?;

    let embedder = OllamaEmbedder::new(client, &settings.model, settings.dimensions)
        .with_base_url(&settings.base_url)
        .with_batch_size(settings.batch_size)
        .with_retry(
            settings.max_attempts,
            Duration::from_millis(settings.retry_backoff_ms),
        );

    Ok(Arc::new(CachedEmbedder::new(embedder, settings.cache_capacity)))
}

fn create_vector_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn VectorStore>, Arc<dyn VectorIndex>)> {
    let settings = &config.vector_store;

    match settings.provider {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryVectorStore::new());
            let index: Arc<dyn VectorIndex> = store.clone();
            let search: Arc<dyn VectorStore> = store;
            Ok((search, index))
        }
        StoreBackend::Qdrant => {
            let client = HttpClient::with_timeout(Duration::from_millis(settings.timeout_ms))?;
            let mut store = QdrantVectorStore::new(client, &settings.url, &settings.collection);
            if let Some(key) = settings
                .api_key_env
                .as_deref()
                .and_then(|env| std::env::var(env).ok())
            {
                store = store.with_api_key(key);
            }
            let store = Arc::new(store);
            let index: Arc<dyn VectorIndex> = store.clone();
            let search: Arc<dyn VectorStore> = store;
            Ok((search, index))
        }
        StoreBackend::Neo4j => bail!("neo4j is not a vector store backend"),
    }
}

fn create_graph_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn GraphStore>, Arc<dyn GraphIndex>)> {
    let settings = &config.graph_store;

    match settings.provider {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryGraphStore::new());
            let index: Arc<dyn GraphIndex> = store.clone();
            let search: Arc<dyn GraphStore> = store;
            Ok((search, index))
        }
        StoreBackend::Neo4j => {
            let password = std::env::var(&settings.password_env)
                .with_context(|| format!("{} is not set", settings.password_env))?;
            let client = HttpClient::with_timeout(Duration::from_millis(settings.timeout_ms))?;
            let store = Arc::new(Neo4jGraphStore::new(
                client,
                &settings.url,
                &settings.database,
                &settings.username,
                &password,
            ));
            let index: Arc<dyn GraphIndex> = store.clone();
            let search: Arc<dyn GraphStore> = store;
            Ok((search, index))
        }
        StoreBackend::Qdrant => bail!("qdrant is not a graph store backend"),
    }
}
