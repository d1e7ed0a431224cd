//! Provider router - cascades one logical generation across ordered backends

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot};
use crate::domain::llm::{LlmProvider, LlmRequest, LlmStream, Usage};
use crate::domain::DomainError;

/// Per-provider call settings
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// USD per million prompt tokens
    pub input_cost_per_million: f64,
    /// USD per million completion tokens
    pub output_cost_per_million: f64,
}

impl ProviderSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout: Duration::from_secs(30),
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pricing(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.input_cost_per_million = input_per_million;
        self.output_cost_per_million = output_per_million;
        self
    }

    pub fn cost_of(&self, usage: &Usage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_cost_per_million
            + usage.completion_tokens as f64 * self.output_cost_per_million)
            / 1_000_000.0
    }
}

/// A backend registered with the router, in priority order
#[derive(Debug, Clone)]
pub struct RoutedProvider {
    pub name: String,
    pub provider: Arc<dyn LlmProvider>,
    pub settings: ProviderSettings,
}

impl RoutedProvider {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        settings: ProviderSettings,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            settings,
        }
    }
}

/// Result of a blocking generation
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: Usage,
    pub latency_ms: u64,
    pub cost_usd: f64,
}

/// Result of a non-blocking generation: the stream is already established
pub struct GenerationStream {
    pub provider: String,
    pub model: String,
    pub stream: LlmStream,
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}

/// Per-provider call counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderMetrics {
    pub calls: u64,
    pub failures: u64,
    pub total_latency_ms: u64,
}

impl ProviderMetrics {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.calls as f64
        }
    }
}

/// Aggregated router metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterMetrics {
    pub providers: HashMap<String, ProviderMetrics>,
}

/// Health view of one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub model: String,
    pub circuit: CircuitSnapshot,
    pub metrics: ProviderMetrics,
}

/// Ordered LLM backends behind one circuit breaker each
///
/// Safe to share across concurrent queries; breaker state is the only
/// process-wide mutable state and is never locked across a provider call.
#[derive(Debug)]
pub struct ProviderRouter {
    providers: Vec<RoutedProvider>,
    breakers: Vec<CircuitBreaker>,
    metrics: RwLock<RouterMetrics>,
}

impl ProviderRouter {
    pub fn new(
        providers: Vec<RoutedProvider>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, DomainError> {
        if providers.is_empty() {
            return Err(DomainError::configuration(
                "At least one LLM provider must be configured",
            ));
        }

        let breakers = providers
            .iter()
            .map(|_| CircuitBreaker::new(config.clone()))
            .collect();

        Ok(Self {
            providers,
            breakers,
            metrics: RwLock::new(RouterMetrics::default()),
        })
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    /// Blocking mode: the full completion text from the first healthy provider
    pub async fn generate(&self, request: LlmRequest) -> Result<Generation, DomainError> {
        let (response, routed, latency) = self
            .cascade("generate", |provider, settings, name| {
                let request = request
                    .clone()
                    .with_defaults(settings.temperature, settings.max_tokens);
                async move {
                    let response = provider.chat(&settings.model, request).await?;
                    if response.content().trim().is_empty() {
                        return Err(DomainError::malformed_response(name, "empty completion"));
                    }
                    Ok(response)
                }
            })
            .await?;

        let usage = response.usage.unwrap_or_default();

        Ok(Generation {
            text: response.content().to_string(),
            provider: routed.name.clone(),
            model: routed.settings.model.clone(),
            cost_usd: routed.settings.cost_of(&usage),
            usage,
            latency_ms: latency.as_millis() as u64,
        })
    }

    /// Non-blocking mode: a token stream from the first provider that accepts
    /// the request. Failures after the stream is established are not cascaded.
    pub async fn generate_stream(
        &self,
        request: LlmRequest,
    ) -> Result<GenerationStream, DomainError> {
        let (stream, routed, _) = self
            .cascade("generate_stream", |provider, settings, _| {
                let request = request
                    .clone()
                    .with_defaults(settings.temperature, settings.max_tokens);
                async move { provider.chat_stream(&settings.model, request).await }
            })
            .await?;

        Ok(GenerationStream {
            provider: routed.name.clone(),
            model: routed.settings.model.clone(),
            stream,
        })
    }

    async fn cascade<T, F, Fut>(
        &self,
        mode: &'static str,
        call: F,
    ) -> Result<(T, &RoutedProvider, Duration), DomainError>
    where
        F: Fn(Arc<dyn LlmProvider>, ProviderSettings, String) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempts = 0;
        let mut last_error: Option<String> = None;

        for (routed, breaker) in self.providers.iter().zip(&self.breakers) {
            let Some(permit) = breaker.try_acquire(Instant::now()) else {
                debug!(provider = %routed.name, mode, "Circuit open, skipping provider");
                last_error.get_or_insert_with(|| format!("{}: circuit open", routed.name));
                continue;
            };

            attempts += 1;
            let probe = permit.is_probe();
            let start = Instant::now();

            let outcome = match timeout(
                routed.settings.timeout,
                call(
                    Arc::clone(&routed.provider),
                    routed.settings.clone(),
                    routed.name.clone(),
                ),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DomainError::provider_timeout(
                    &routed.name,
                    routed.settings.timeout.as_millis() as u64,
                )),
            };

            let latency = start.elapsed();
            let latency_ms = latency.as_millis() as u64;

            match outcome {
                Ok(value) => {
                    permit.succeed();
                    self.record_attempt(&routed.name, latency, true).await;
                    info!(
                        provider = %routed.name,
                        mode,
                        latency_ms,
                        probe,
                        outcome = "success",
                        "Provider attempt"
                    );
                    return Ok((value, routed, latency));
                }
                Err(e) => {
                    let circuit = permit.fail(Instant::now());
                    self.record_attempt(&routed.name, latency, false).await;
                    warn!(
                        provider = %routed.name,
                        mode,
                        latency_ms,
                        probe,
                        outcome = "failure",
                        error_code = e.code(),
                        circuit = ?circuit,
                        error = %e,
                        "Provider attempt"
                    );
                    last_error = Some(format!("{}: {}", routed.name, e));
                }
            }
        }

        Err(DomainError::all_providers_exhausted(
            attempts,
            last_error.unwrap_or_else(|| "no providers available".to_string()),
        ))
    }

    async fn record_attempt(&self, provider: &str, latency: Duration, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        let labels = [
            ("provider", provider.to_string()),
            ("outcome", outcome.to_string()),
        ];
        counter!("graphmind_provider_calls_total", &labels).increment(1);
        histogram!("graphmind_provider_latency_seconds", "provider" => provider.to_string())
            .record(latency.as_secs_f64());

        let mut metrics = self.metrics.write().await;
        let entry = metrics.providers.entry(provider.to_string()).or_default();
        entry.calls += 1;
        entry.total_latency_ms += latency.as_millis() as u64;
        if !success {
            entry.failures += 1;
        }
    }

    pub async fn metrics(&self) -> RouterMetrics {
        self.metrics.read().await.clone()
    }

    /// Read-only circuit and call statistics per provider, in priority order
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let now = Instant::now();
        let metrics = self.metrics.read().await;

        self.providers
            .iter()
            .zip(&self.breakers)
            .map(|(routed, breaker)| ProviderHealth {
                name: routed.name.clone(),
                model: routed.settings.model.clone(),
                circuit: breaker.snapshot(now),
                metrics: metrics
                    .providers
                    .get(&routed.name)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{Message, MockLlmProvider};
    use crate::domain::routing::CircuitState;
    use futures::StreamExt;

    fn routed(mock: Arc<MockLlmProvider>, name: &str) -> RoutedProvider {
        RoutedProvider::new(name, mock, ProviderSettings::new(format!("{}-model", name)))
    }

    fn config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            base_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(600),
            jitter_ratio: 0.0,
        }
    }

    fn request() -> LlmRequest {
        LlmRequest::new(vec![Message::user("What is X?")])
    }

    #[test]
    fn test_router_requires_a_provider() {
        let result = ProviderRouter::new(vec![], config(5));
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_cascade_falls_through_to_third_provider() {
        let a = Arc::new(MockLlmProvider::new("a").with_error("connection refused"));
        let b = Arc::new(
            MockLlmProvider::new("b")
                .with_script(vec![Err(DomainError::rate_limited("b"))]),
        );
        let c = Arc::new(MockLlmProvider::new("c").with_response("answer from c"));

        let router = ProviderRouter::new(
            vec![
                routed(a.clone(), "a"),
                routed(b.clone(), "b"),
                routed(c.clone(), "c"),
            ],
            config(5),
        )
        .unwrap();

        let generation = router.generate(request()).await.unwrap();

        assert_eq!(generation.text, "answer from c");
        assert_eq!(generation.provider, "c");
        assert_eq!(generation.model, "c-model");
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
        assert_eq!(c.call_count(), 1);

        let metrics = router.metrics().await;
        assert_eq!(metrics.providers["a"].failures, 1);
        assert_eq!(metrics.providers["b"].failures, 1);
        assert_eq!(metrics.providers["c"].failures, 0);
        assert_eq!(metrics.providers["c"].calls, 1);
    }

    #[tokio::test]
    async fn test_all_failing_providers_exhaust() {
        let a = Arc::new(MockLlmProvider::new("a").with_error("down"));
        let b = Arc::new(MockLlmProvider::new("b").with_error("down"));

        let router =
            ProviderRouter::new(vec![routed(a.clone(), "a"), routed(b, "b")], config(5))
                .unwrap();

        let error = router.generate(request()).await.unwrap_err();

        match error {
            DomainError::AllProvidersExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.starts_with("b:"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_provider_without_calling_it() {
        let a = Arc::new(MockLlmProvider::new("a").with_error("down"));
        let b = Arc::new(MockLlmProvider::new("b").with_response("ok"));

        let router =
            ProviderRouter::new(vec![routed(a.clone(), "a"), routed(b, "b")], config(2))
                .unwrap();

        for _ in 0..2 {
            router.generate(request()).await.unwrap();
        }
        assert_eq!(a.call_count(), 2);

        let health = router.health().await;
        assert_eq!(health[0].circuit.state, CircuitState::Open);
        assert_eq!(health[1].circuit.state, CircuitState::Closed);

        let generation = router.generate(request()).await.unwrap();
        assert_eq!(generation.provider, "b");
        assert_eq!(a.call_count(), 2);
    }

    #[tokio::test]
    async fn test_every_circuit_open_reports_zero_attempts() {
        let a = Arc::new(MockLlmProvider::new("a").with_error("down"));
        let router = ProviderRouter::new(vec![routed(a, "a")], config(1)).unwrap();

        let _ = router.generate(request()).await;
        let error = router.generate(request()).await.unwrap_err();

        assert!(matches!(
            error,
            DomainError::AllProvidersExhausted { attempts: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_completion_is_malformed_and_cascades() {
        let a = Arc::new(MockLlmProvider::new("a").with_response("   "));
        let b = Arc::new(MockLlmProvider::new("b").with_response("real answer"));

        let router =
            ProviderRouter::new(vec![routed(a, "a"), routed(b, "b")], config(5)).unwrap();

        let generation = router.generate(request()).await.unwrap();
        assert_eq!(generation.provider, "b");
    }

    #[tokio::test]
    async fn test_provider_defaults_fill_request() {
        let a = Arc::new(MockLlmProvider::new("a").with_response("ok"));
        let settings = ProviderSettings::new("m")
            .with_temperature(0.3)
            .with_max_tokens(512);
        let router = ProviderRouter::new(
            vec![RoutedProvider::new("a", a.clone(), settings)],
            config(5),
        )
        .unwrap();

        router.generate(request()).await.unwrap();

        let sent = &a.requests()[0];
        assert_eq!(sent.temperature, Some(0.3));
        assert_eq!(sent.max_tokens, Some(512));
    }

    #[tokio::test]
    async fn test_generation_reports_usage_and_cost() {
        let a = Arc::new(MockLlmProvider::new("a").with_response("ok"));
        let settings = ProviderSettings::new("m").with_pricing(1.0, 2.0);
        let router =
            ProviderRouter::new(vec![RoutedProvider::new("a", a, settings)], config(5)).unwrap();

        let generation = router.generate(request()).await.unwrap();

        assert_eq!(generation.usage.prompt_tokens, 10);
        assert_eq!(generation.usage.completion_tokens, 5);
        assert!((generation.cost_usd - 0.00002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_stream_mode_shares_cascade() {
        let a = Arc::new(MockLlmProvider::new("a").with_error("down"));
        let b = Arc::new(MockLlmProvider::new("b").with_response("streamed answer"));

        let router =
            ProviderRouter::new(vec![routed(a, "a"), routed(b, "b")], config(5)).unwrap();

        let generation = router.generate_stream(request()).await.unwrap();
        assert_eq!(generation.provider, "b");

        let text: String = generation
            .stream
            .filter_map(|chunk| async move { chunk.ok().and_then(|c| c.delta) })
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "streamed answer");
    }
}
