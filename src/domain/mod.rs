//! Domain layer - Core query orchestration logic and entities

pub mod agent;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod llm;
pub mod retrieval;
pub mod routing;

pub use agent::{Orchestrator, OrchestratorConfig, Query, QueryResponse};
pub use embedding::EmbeddingProvider;
pub use error::DomainError;
pub use evaluation::{Evaluator, RetryPolicy, ScoringEngine, ScoringMethod};
pub use llm::{
    FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message, MessageRole,
    StreamChunk, Usage,
};
pub use retrieval::{Citation, GraphStore, HybridRetriever, RetrievalConfig, VectorStore};
pub use routing::{CircuitBreakerConfig, ProviderRouter, ProviderSettings, RoutedProvider};
