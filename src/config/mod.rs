//! Application configuration

mod app_config;

pub use app_config::{
    AgentsConfig, AppConfig, CacheConfig, CircuitBreakerSection, EmbeddingsConfig,
    GraphStoreConfig, LlmConfig, LogFormat, LoggingConfig, ProviderConfig, RetrievalSection,
    StoreBackend, VectorStoreConfig,
};
