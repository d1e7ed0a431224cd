//! Orchestrator - the per-query plan/retrieve/synthesize/evaluate state machine

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream;
use metrics::counter;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use super::planner::Planner;
use super::prompts::INSUFFICIENT_INFORMATION;
use super::query::{Query, QueryResponse};
use super::rewriter::Rewriter;
use super::state::{AgentState, Stage, transition};
use super::synthesizer::{Synthesizer, build_request};
use crate::domain::DomainError;
use crate::domain::evaluation::{Evaluator, ScoringEngine};
use crate::domain::llm::{FinishReason, LlmStream, StreamChunk};
use crate::domain::retrieval::{Citation, HybridRetriever, RetrievalSource};
use crate::domain::routing::ProviderRouter;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Budget for the whole query, retries included
    pub query_timeout: Duration,
    pub max_context_documents: usize,
    /// Engine for queries that do not pick one
    pub default_engine: ScoringEngine,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(120),
            max_context_documents: 10,
            default_engine: ScoringEngine::Judge,
        }
    }
}

/// Streaming answer: context citations up front, tokens as they arrive
pub struct AnswerStream {
    pub query_id: Uuid,
    pub sub_questions: Vec<String>,
    pub citations: Vec<Citation>,
    pub degraded_sources: Vec<RetrievalSource>,
    pub provider: Option<String>,
    pub stream: LlmStream,
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("query_id", &self.query_id)
            .field("citations", &self.citations.len())
            .field("provider", &self.provider)
            .finish()
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    router: Arc<ProviderRouter>,
    retriever: Arc<HybridRetriever>,
    planner: Planner,
    synthesizer: Synthesizer,
    evaluator: Evaluator,
    rewriter: Rewriter,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        router: Arc<ProviderRouter>,
        retriever: Arc<HybridRetriever>,
        evaluator: Evaluator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            planner: Planner::new(Arc::clone(&router)),
            synthesizer: Synthesizer::new(Arc::clone(&router), config.max_context_documents),
            rewriter: Rewriter::new(Arc::clone(&router)),
            router,
            retriever,
            evaluator,
            config,
        }
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Engine used when a query does not pick one
    pub fn default_engine(&self) -> ScoringEngine {
        self.config.default_engine
    }

    /// Answer a query. Fatal errors (provider exhaustion, both retrieval
    /// sources down, timeout) abort with no partial answer.
    pub async fn run(&self, query: &Query) -> Result<QueryResponse, DomainError> {
        query.validate()?;
        let started = Instant::now();

        let result = match timeout(self.config.query_timeout, self.execute(query, started)).await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(started.elapsed().as_millis() as u64)),
        };

        let outcome = match &result {
            Ok(response) if response.low_confidence => "low_confidence",
            Ok(_) => "accepted",
            Err(e) => e.code(),
        };
        counter!("graphmind_queries_total", "outcome" => outcome).increment(1);

        result
    }

    async fn execute(&self, query: &Query, started: Instant) -> Result<QueryResponse, DomainError> {
        let policy = self.evaluator.policy();
        let mut state = AgentState::new(query, self.config.default_engine);
        let mut stage = Stage::Planning;

        loop {
            debug!(
                query_id = %state.query_id,
                stage = %stage,
                retry_count = state.retry_count,
                "Entering stage"
            );

            match stage {
                Stage::Planning => self.plan(&mut state).await,
                Stage::Retrieving => self.retrieve(&mut state, query.top_k).await?,
                Stage::Synthesizing => self.synthesize(&mut state).await?,
                Stage::Evaluating => self.evaluate(&mut state).await?,
                Stage::Rewriting => self.rewrite(&mut state).await,
                Stage::Accepted => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    info!(
                        query_id = %state.query_id,
                        latency_ms,
                        retry_count = state.retry_count,
                        best_score = state.best.as_ref().map(|b| b.score.combined),
                        "Query accepted"
                    );
                    return state.into_response(latency_ms, &policy).ok_or_else(|| {
                        DomainError::internal("Query accepted without an evaluated attempt")
                    });
                }
            }

            stage = transition(stage, &state, &policy);
        }
    }

    async fn plan(&self, state: &mut AgentState) {
        let plan = self.planner.plan(&state.question).await;
        if let Some(generation) = &plan.generation {
            state.absorb(generation);
        }
        state.sub_questions = plan.sub_questions;
    }

    async fn retrieve(&self, state: &mut AgentState, top_k: usize) -> Result<(), DomainError> {
        let outcome = self
            .retriever
            .retrieve_all(&state.sub_questions, top_k)
            .await?;
        state.note_degraded(&outcome.degraded);
        state.results = outcome.results;
        Ok(())
    }

    async fn synthesize(&self, state: &mut AgentState) -> Result<(), DomainError> {
        let synthesis = self
            .synthesizer
            .synthesize(&state.original_question, &state.results)
            .await?;

        if let Some(generation) = &synthesis.generation {
            state.absorb(generation);
            state.answer_provider = Some(generation.provider.clone());
        }
        state.answer = synthesis.answer;
        state.citations = synthesis.citations;
        state.sources_used = synthesis.sources_used;
        Ok(())
    }

    async fn evaluate(&self, state: &mut AgentState) -> Result<(), DomainError> {
        let evaluation = self
            .evaluator
            .evaluate(
                &state.original_question,
                &state.answer,
                self.synthesizer.context(&state.results),
                state.engine,
            )
            .await?;

        if let Some(generation) = &evaluation.generation {
            state.absorb(generation);
        }
        state.evaluation = Some(evaluation.score);
        state.scoring_method = Some(evaluation.method);

        if state.record_attempt() {
            debug!(query_id = %state.query_id, retry_count = state.retry_count, "New best attempt");
        }
        Ok(())
    }

    async fn rewrite(&self, state: &mut AgentState) {
        let feedback = state
            .evaluation
            .as_ref()
            .map(|score| score.feedback.clone())
            .unwrap_or_default();

        let rewrite = self.rewriter.rewrite(&state.question, &feedback).await;
        if let Some(generation) = &rewrite.generation {
            state.absorb(generation);
        }

        counter!("graphmind_query_retries_total").increment(1);
        info!(
            query_id = %state.query_id,
            retry_count = state.retry_count + 1,
            question = %rewrite.question,
            "Retrying with rewritten question"
        );
        state.begin_retry(rewrite.question);
    }

    /// Plan and retrieve, then stream the synthesized answer. No evaluation
    /// loop runs on this path; the timeout covers setup, not consumption.
    pub async fn stream_answer(&self, query: &Query) -> Result<AnswerStream, DomainError> {
        query.validate()?;
        let started = Instant::now();

        match timeout(self.config.query_timeout, self.open_stream(query)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(started.elapsed().as_millis() as u64)),
        }
    }

    async fn open_stream(&self, query: &Query) -> Result<AnswerStream, DomainError> {
        let mut state = AgentState::new(query, self.config.default_engine);
        self.plan(&mut state).await;
        self.retrieve(&mut state, query.top_k).await?;

        let context = self.synthesizer.context(&state.results);
        let citations: Vec<Citation> = context.iter().map(Citation::from_result).collect();

        let (provider, stream) = if context.is_empty() {
            let chunk = StreamChunk::new(state.query_id.to_string(), String::new())
                .with_delta(INSUFFICIENT_INFORMATION)
                .with_finish_reason(FinishReason::Stop);
            let stream: LlmStream = Box::pin(stream::iter(vec![Ok(chunk)]));
            (None, stream)
        } else {
            let generation = self
                .router
                .generate_stream(build_request(&state.original_question, context))
                .await?;
            (Some(generation.provider), generation.stream)
        };

        Ok(AnswerStream {
            query_id: state.query_id,
            sub_questions: state.sub_questions,
            citations,
            degraded_sources: state.degraded,
            provider,
            stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::prompts::{PLANNER_SYSTEM, REWRITER_SYSTEM, SYNTHESIZER_SYSTEM};
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::evaluation::{LlmJudgeScorer, RetryPolicy, ScoringMethod};
    use crate::domain::llm::{LlmProvider, LlmRequest, LlmResponse, Message, MockLlmProvider};
    use crate::domain::retrieval::{
        GraphNode, MockGraphStore, MockVectorStore, RetrievalConfig, VectorHit,
    };
    use crate::domain::routing::{CircuitBreakerConfig, ProviderSettings, RoutedProvider};
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Step {
        Plan,
        Synthesize,
        Judge,
        Rewrite,
    }

    fn step_of(request: &LlmRequest) -> Step {
        match request.system_prompt() {
            Some(PLANNER_SYSTEM) => Step::Plan,
            Some(SYNTHESIZER_SYSTEM) => Step::Synthesize,
            Some(REWRITER_SYSTEM) => Step::Rewrite,
            _ => Step::Judge,
        }
    }

    fn judge_json(r: f64, g: f64, c: f64) -> String {
        format!(
            r#"{{"relevancy": {}, "groundedness": {}, "completeness": {}, "feedback": "add detail"}}"#,
            r, g, c
        )
    }

    fn hit(doc: &str, score: f32, text: &str) -> VectorHit {
        VectorHit::new(doc, score).with_payload("text", json!(text))
    }

    fn vector_store(hits: Vec<VectorHit>) -> MockVectorStore {
        let mut store = MockVectorStore::new();
        store.expect_search().returning(move |_, _| Ok(hits.clone()));
        store
    }

    fn graph_store(nodes: Vec<GraphNode>) -> MockGraphStore {
        let mut store = MockGraphStore::new();
        store
            .expect_find_entities()
            .returning(|_, _| Ok(vec!["X".to_string()]));
        store.expect_expand().returning(move |_, _| Ok(nodes.clone()));
        store
    }

    fn failing_graph_store() -> MockGraphStore {
        let mut store = MockGraphStore::new();
        store
            .expect_find_entities()
            .returning(|_, _| Err(DomainError::store("neo4j", "connection refused")));
        store
    }

    fn orchestrator_with(
        provider: Arc<dyn LlmProvider>,
        vector: MockVectorStore,
        graph: MockGraphStore,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        let router = Arc::new(
            ProviderRouter::new(
                vec![RoutedProvider::new(
                    "primary",
                    provider,
                    ProviderSettings::new("m").with_pricing(1.0, 1.0),
                )],
                CircuitBreakerConfig::default(),
            )
            .unwrap(),
        );
        let retriever = Arc::new(HybridRetriever::new(
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(vector),
            Arc::new(graph),
            RetrievalConfig::default(),
        ));
        let evaluator = Evaluator::new(
            Arc::new(LlmJudgeScorer::new(Arc::clone(&router))),
            RetryPolicy::default(),
        );

        Orchestrator::new(router, retriever, evaluator, config)
    }

    fn orchestrator(
        provider: MockLlmProvider,
        vector: MockVectorStore,
        graph: MockGraphStore,
    ) -> Orchestrator {
        orchestrator_with(Arc::new(provider), vector, graph, OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_end_to_end_first_attempt_accepted() {
        let provider = MockLlmProvider::new("primary").with_handler(|request| {
            Ok(match step_of(request) {
                Step::Plan => "What is X?".to_string(),
                Step::Synthesize => {
                    "X is a connected component [Source: doc2] described in the manual [Source: doc1]."
                        .to_string()
                }
                Step::Judge => judge_json(0.9, 0.9, 0.65),
                Step::Rewrite => "unused".to_string(),
            })
        });
        let orchestrator = orchestrator(
            provider,
            vector_store(vec![
                hit("doc1", 0.9, "X is described in the manual"),
                hit("doc2", 0.7, "X is a connected component"),
            ]),
            graph_store(vec![GraphNode::new("doc2", "X: connected component")]),
        );

        let response = orchestrator.run(&Query::new("What is X?")).await.unwrap();

        assert_eq!(response.retry_count, 0);
        assert!((response.eval_score - 0.85).abs() < 1e-9);
        assert!(!response.low_confidence);
        assert_eq!(response.scoring_method, ScoringMethod::Judge);
        assert_eq!(response.sources_used, 2);
        let cited: Vec<&str> = response
            .citations
            .iter()
            .map(|c| c.document_id.as_str())
            .collect();
        assert_eq!(cited, vec!["doc2", "doc1"]);
        assert_eq!(response.provider_used.as_deref(), Some("primary"));
        assert!(response.degraded_sources.is_empty());
    }

    #[tokio::test]
    async fn test_retry_returns_best_attempt() {
        let judged = Arc::new(AtomicUsize::new(0));
        let synthesized = Arc::new(AtomicUsize::new(0));
        let scores = [0.3, 0.5, 0.4];

        let provider = {
            let judged = Arc::clone(&judged);
            let synthesized = Arc::clone(&synthesized);
            MockLlmProvider::new("primary").with_handler(move |request| {
                Ok(match step_of(request) {
                    Step::Plan => "What is X?".to_string(),
                    Step::Synthesize => {
                        let n = synthesized.fetch_add(1, Ordering::SeqCst);
                        format!("answer {} [Source: doc1]", n)
                    }
                    Step::Judge => {
                        let s = scores[judged.fetch_add(1, Ordering::SeqCst)];
                        judge_json(s, s, s)
                    }
                    Step::Rewrite => "What precisely is X?".to_string(),
                })
            })
        };
        let orchestrator = orchestrator(
            provider,
            vector_store(vec![hit("doc1", 0.9, "X is a thing")]),
            graph_store(vec![]),
        );

        let response = orchestrator.run(&Query::new("What is X?")).await.unwrap();

        assert_eq!(judged.load(Ordering::SeqCst), 3);
        assert_eq!(response.retry_count, 2);
        assert!((response.eval_score - 0.5).abs() < 1e-9);
        assert_eq!(response.answer, "answer 1 [Source: doc1]");
        assert!(response.low_confidence);
    }

    #[tokio::test]
    async fn test_graph_failure_degrades_gracefully() {
        let provider = MockLlmProvider::new("primary").with_handler(|request| {
            Ok(match step_of(request) {
                Step::Synthesize => "Answer [Source: a] [Source: b] [Source: c]".to_string(),
                Step::Judge => judge_json(1.0, 1.0, 1.0),
                _ => "What is X?".to_string(),
            })
        });
        let orchestrator = orchestrator(
            provider,
            vector_store(vec![
                hit("a", 0.9, "alpha"),
                hit("b", 0.8, "beta"),
                hit("c", 0.7, "gamma"),
            ]),
            failing_graph_store(),
        );

        let response = orchestrator.run(&Query::new("What is X?")).await.unwrap();

        assert_eq!(response.sources_used, 3);
        assert_eq!(response.citations.len(), 3);
        assert_eq!(response.degraded_sources, vec![RetrievalSource::Graph]);
    }

    #[tokio::test]
    async fn test_both_retrieval_sources_down_is_fatal() {
        let mut vector = MockVectorStore::new();
        vector
            .expect_search()
            .returning(|_, _| Err(DomainError::store("qdrant", "down")));
        let orchestrator = orchestrator(
            MockLlmProvider::new("primary").with_response("What is X?"),
            vector,
            failing_graph_store(),
        );

        let error = orchestrator.run(&Query::new("What is X?")).await.unwrap_err();

        assert_eq!(error.code(), "RETRIEVAL_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_provider_exhaustion_aborts_query() {
        let orchestrator = orchestrator(
            MockLlmProvider::new("primary").with_error("down"),
            vector_store(vec![hit("doc1", 0.9, "X")]),
            graph_store(vec![]),
        );

        let error = orchestrator.run(&Query::new("What is X?")).await.unwrap_err();

        assert!(matches!(error, DomainError::AllProvidersExhausted { .. }));
    }

    #[tokio::test]
    async fn test_empty_retrieval_answers_insufficient_information() {
        let provider = MockLlmProvider::new("primary").with_handler(|request| {
            Ok(match step_of(request) {
                Step::Judge => judge_json(1.0, 1.0, 0.5),
                _ => "What is X?".to_string(),
            })
        });
        let orchestrator = orchestrator(provider, vector_store(vec![]), graph_store(vec![]));

        let response = orchestrator.run(&Query::new("What is X?")).await.unwrap();

        assert_eq!(response.answer, INSUFFICIENT_INFORMATION);
        assert!(response.citations.is_empty());
        assert_eq!(response.sources_used, 0);
    }

    #[tokio::test]
    async fn test_heuristic_engine_never_calls_judge() {
        let judged = Arc::new(AtomicUsize::new(0));
        let provider = {
            let judged = Arc::clone(&judged);
            MockLlmProvider::new("primary").with_handler(move |request| {
                Ok(match step_of(request) {
                    Step::Synthesize => {
                        "X is a thing documented widely [Source: doc1]".to_string()
                    }
                    Step::Judge => {
                        judged.fetch_add(1, Ordering::SeqCst);
                        judge_json(1.0, 1.0, 1.0)
                    }
                    _ => "What is X?".to_string(),
                })
            })
        };
        let orchestrator = orchestrator(
            provider,
            vector_store(vec![hit("doc1", 0.9, "X is a thing documented widely")]),
            graph_store(vec![]),
        );

        let response = orchestrator
            .run(&Query::new("What is X?").with_engine(ScoringEngine::Heuristic))
            .await
            .unwrap();

        assert_eq!(judged.load(Ordering::SeqCst), 0);
        assert_eq!(response.scoring_method, ScoringMethod::Heuristic);
    }

    #[tokio::test]
    async fn test_usage_and_cost_accumulate() {
        let provider = MockLlmProvider::new("primary").with_handler(|request| {
            Ok(match step_of(request) {
                Step::Synthesize => "X [Source: doc1]".to_string(),
                Step::Judge => judge_json(1.0, 1.0, 1.0),
                _ => "What is X?".to_string(),
            })
        });
        let orchestrator = orchestrator(
            provider,
            vector_store(vec![hit("doc1", 0.9, "X")]),
            graph_store(vec![]),
        );

        let response = orchestrator.run(&Query::new("What is X?")).await.unwrap();

        // plan + synthesize + judge, 10 prompt and 5 completion tokens each
        assert_eq!(response.usage.prompt_tokens, 30);
        assert_eq!(response.usage.completion_tokens, 15);
        assert!((response.cost_usd - 45.0 / 1_000_000.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_invalid_query_is_rejected() {
        let orchestrator = orchestrator(
            MockLlmProvider::new("primary").with_response("unused"),
            MockVectorStore::new(),
            MockGraphStore::new(),
        );

        let error = orchestrator.run(&Query::new("X?")).await.unwrap_err();

        assert_eq!(error.code(), "VALIDATION_ERROR");
    }

    #[derive(Debug)]
    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn chat(&self, model: &str, _request: LlmRequest) -> Result<LlmResponse, DomainError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LlmResponse::new(
                "slow".to_string(),
                model.to_string(),
                Message::assistant("late"),
            ))
        }

        async fn chat_stream(
            &self,
            _model: &str,
            _request: LlmRequest,
        ) -> Result<LlmStream, DomainError> {
            Err(DomainError::provider("slow", "streaming not supported"))
        }

        fn provider_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_query_timeout_covers_whole_pipeline() {
        let orchestrator = orchestrator_with(
            Arc::new(SlowProvider),
            vector_store(vec![hit("doc1", 0.9, "X")]),
            graph_store(vec![]),
            OrchestratorConfig {
                query_timeout: Duration::from_millis(50),
                ..OrchestratorConfig::default()
            },
        );

        let error = orchestrator.run(&Query::new("What is X?")).await.unwrap_err();

        assert_eq!(error.code(), "QUERY_TIMEOUT");
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn test_stream_answer() {
        let provider = MockLlmProvider::new("primary").with_handler(|request| {
            Ok(match step_of(request) {
                Step::Synthesize => "X is a thing [Source: doc1]".to_string(),
                _ => "What is X?".to_string(),
            })
        });
        let orchestrator = orchestrator(
            provider,
            vector_store(vec![hit("doc1", 0.9, "X is a thing")]),
            graph_store(vec![]),
        );

        let answer = orchestrator
            .stream_answer(&Query::new("What is X?"))
            .await
            .unwrap();

        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.provider.as_deref(), Some("primary"));
        let text: String = answer
            .stream
            .filter_map(|chunk| async move { chunk.ok().and_then(|c| c.delta) })
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "X is a thing [Source: doc1]");
    }

    #[tokio::test]
    async fn test_stream_answer_without_context() {
        let orchestrator = orchestrator(
            MockLlmProvider::new("primary").with_response("What is X?"),
            vector_store(vec![]),
            graph_store(vec![]),
        );

        let answer = orchestrator
            .stream_answer(&Query::new("What is X?"))
            .await
            .unwrap();

        assert!(answer.provider.is_none());
        let chunks: Vec<_> = answer.stream.collect().await;
        assert_eq!(chunks.len(), 1);
    }
}
