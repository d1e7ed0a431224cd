//! LLM provider routing with per-provider circuit breakers

mod circuit;
mod provider_router;

pub use circuit::{
    CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitSnapshot, CircuitState,
};
pub use provider_router::{
    Generation, GenerationStream, ProviderHealth, ProviderMetrics, ProviderRouter,
    ProviderSettings, RouterMetrics, RoutedProvider,
};
