use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub circuit_breaker: CircuitBreakerSection,
    pub embeddings: EmbeddingsConfig,
    pub vector_store: VectorStoreConfig,
    pub graph_store: GraphStoreConfig,
    pub retrieval: RetrievalSection,
    pub agents: AgentsConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Providers in cascade priority order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig::new(
                    "groq",
                    "https://api.groq.com/openai/v1",
                    "llama-3.3-70b-versatile",
                )
                .with_api_key_env("GROQ_API_KEY"),
                ProviderConfig::new(
                    "gemini",
                    "https://generativelanguage.googleapis.com/v1beta/openai",
                    "gemini-2.0-flash",
                )
                .with_api_key_env("GEMINI_API_KEY"),
                ProviderConfig::new("ollama", "http://localhost:11434/v1", "llama3.2"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    /// Name of the environment variable holding the key; unset for keyless backends
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub input_cost_per_million: f64,
    #[serde(default)]
    pub output_cost_per_million: f64,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key_env: None,
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_provider_timeout_ms(),
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
        }
    }

    pub fn with_api_key_env(mut self, env: impl Into<String>) -> Self {
        self.api_key_env = Some(env.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSection {
    pub failure_threshold: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ratio: f64,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            jitter_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub cache_capacity: u64,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
            cache_capacity: 2048,
            timeout_ms: 30_000,
            max_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Qdrant,
    Neo4j,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub provider: StoreBackend,
    pub url: String,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreBackend::Memory,
            url: "http://localhost:6333".to_string(),
            collection: "graphmind_docs".to_string(),
            api_key_env: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStoreConfig {
    pub provider: StoreBackend,
    /// HTTP endpoint of the transactional API
    pub url: String,
    pub username: String,
    pub password_env: String,
    pub database: String,
    pub timeout_ms: u64,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreBackend::Memory,
            url: "http://localhost:7474".to_string(),
            username: "neo4j".to_string(),
            password_env: "NEO4J_PASSWORD".to_string(),
            database: "neo4j".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub vector_top_k: usize,
    pub graph_hops: u32,
    pub graph_seed_limit: usize,
    pub rrf_k: f64,
    pub final_top_n: usize,
    pub max_concurrency: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            vector_top_k: 20,
            graph_hops: 2,
            graph_seed_limit: 5,
            rrf_k: 60.0,
            final_top_n: 10,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub max_retries: u32,
    pub eval_threshold: f64,
    pub query_timeout_ms: u64,
    pub max_context_documents: usize,
    /// `judge` or `heuristic`
    pub default_engine: String,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            eval_threshold: 0.7,
            query_timeout_ms: 120_000,
            max_context_documents: 10,
            default_engine: "judge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
            ttl_secs: 300,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("GRAPHMIND")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.llm.providers.len(), 3);
        assert_eq!(config.llm.providers[0].name, "groq");
        assert_eq!(config.llm.providers[2].api_key_env, None);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.agents.max_retries, 2);
        assert_eq!(config.embeddings.dimensions, 768);
        assert_eq!(config.vector_store.provider, StoreBackend::Memory);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "retrieval": { "graph_hops": 3 },
            "agents": { "eval_threshold": 0.8 },
            "vector_store": { "provider": "qdrant" },
            "llm": { "providers": [
                { "name": "local", "base_url": "http://localhost:11434/v1", "model": "llama3.2" }
            ]}
        }))
        .unwrap();

        assert_eq!(config.retrieval.graph_hops, 3);
        assert_eq!(config.retrieval.vector_top_k, 20);
        assert_eq!(config.agents.eval_threshold, 0.8);
        assert_eq!(config.agents.max_retries, 2);
        assert_eq!(config.vector_store.provider, StoreBackend::Qdrant);
        assert_eq!(config.llm.providers.len(), 1);
        assert_eq!(config.llm.providers[0].max_tokens, 4096);
        assert_eq!(config.llm.providers[0].timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_log_format_lowercase() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert!(matches!(format, LogFormat::Json));
    }
}
