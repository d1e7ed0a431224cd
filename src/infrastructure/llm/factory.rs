use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::OpenAiCompatibleProvider;
use crate::config::{CircuitBreakerSection, LlmConfig, ProviderConfig};
use crate::domain::routing::{
    CircuitBreakerConfig, ProviderRouter, ProviderSettings, RoutedProvider,
};
use crate::domain::{DomainError, LlmProvider};
use crate::infrastructure::http_client::HttpClient;

/// Factory for the provider cascade
#[derive(Debug)]
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Build the router from configuration, reading API keys from the environment
    pub fn create_router(
        llm: &LlmConfig,
        circuit: &CircuitBreakerSection,
    ) -> Result<ProviderRouter, DomainError> {
        Self::create_router_with(llm, circuit, |name| std::env::var(name).ok())
    }

    /// Providers whose key variable is unset are left out of the cascade
    pub fn create_router_with<F>(
        llm: &LlmConfig,
        circuit: &CircuitBreakerSection,
        lookup_key: F,
    ) -> Result<ProviderRouter, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = Vec::with_capacity(llm.providers.len());

        for config in &llm.providers {
            let api_key = match config.api_key_env {
                Some(ref env) => match lookup_key(env).filter(|key| !key.is_empty()) {
                    Some(key) => Some(key),
                    None => {
                        warn!(provider = %config.name, env = %env, "API key not set, skipping provider");
                        continue;
                    }
                },
                None => None,
            };

            let provider = Self::create_provider(config, api_key.as_deref())?;
            providers.push(RoutedProvider::new(
                config.name.clone(),
                provider,
                Self::settings(config),
            ));
        }

        info!(
            providers = ?providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "Provider cascade configured"
        );

        ProviderRouter::new(providers, Self::circuit_config(circuit))
    }

    pub fn create_provider(
        config: &ProviderConfig,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let client = HttpClient::with_timeout(config.timeout()).map_err(|e| {
            DomainError::configuration(format!("HTTP client for {}: {}", config.name, e))
        })?;

        let mut provider = OpenAiCompatibleProvider::new(client, &config.name, &config.base_url)
            .with_timeout(config.timeout());
        if let Some(key) = api_key {
            provider = provider.with_api_key(key);
        }

        Ok(Arc::new(provider))
    }

    pub fn settings(config: &ProviderConfig) -> ProviderSettings {
        ProviderSettings::new(&config.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_timeout(config.timeout())
            .with_pricing(config.input_cost_per_million, config.output_cost_per_million)
    }

    pub fn circuit_config(section: &CircuitBreakerSection) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: section.failure_threshold.max(1),
            base_backoff: Duration::from_millis(section.base_backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
            jitter_ratio: section.jitter_ratio.clamp(0.0, 1.0),
        }
    }
}
