//! Per-query agent state and the stage transition function

use std::fmt;

use uuid::Uuid;

use super::query::{Query, QueryResponse};
use crate::domain::evaluation::{
    Decision, EvaluationScore, RetryPolicy, ScoringEngine, ScoringMethod,
};
use crate::domain::llm::Usage;
use crate::domain::retrieval::{Citation, FusedResult, RetrievalSource};
use crate::domain::routing::Generation;

/// Orchestrator stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Retrieving,
    Synthesizing,
    Evaluating,
    Rewriting,
    Accepted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Retrieving => "retrieving",
            Self::Synthesizing => "synthesizing",
            Self::Evaluating => "evaluating",
            Self::Rewriting => "rewriting",
            Self::Accepted => "accepted",
        };
        f.write_str(name)
    }
}

/// Next stage after `stage` completed on `state`
pub fn transition(stage: Stage, state: &AgentState, policy: &RetryPolicy) -> Stage {
    match stage {
        Stage::Planning => Stage::Retrieving,
        Stage::Retrieving => Stage::Synthesizing,
        Stage::Synthesizing => Stage::Evaluating,
        Stage::Evaluating => {
            let combined = state.evaluation.as_ref().map_or(0.0, |s| s.combined);
            match policy.decide(combined, state.retry_count) {
                Decision::Accept => Stage::Accepted,
                Decision::Retry => Stage::Rewriting,
            }
        }
        Stage::Rewriting => Stage::Planning,
        Stage::Accepted => Stage::Accepted,
    }
}

/// One complete synthesize-and-evaluate pass
#[derive(Debug, Clone)]
pub struct Attempt {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub score: EvaluationScore,
    pub method: ScoringMethod,
    pub sources_used: usize,
    pub provider: Option<String>,
    /// Sources unavailable while retrieving for this attempt
    pub degraded: Vec<RetrievalSource>,
}

/// Working record for one query execution; never shared across queries
#[derive(Debug, Clone)]
pub struct AgentState {
    pub query_id: Uuid,
    pub original_question: String,
    /// Current question, rewritten on retry
    pub question: String,
    pub engine: ScoringEngine,
    pub sub_questions: Vec<String>,
    pub results: Vec<FusedResult>,
    pub degraded: Vec<RetrievalSource>,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub sources_used: usize,
    pub answer_provider: Option<String>,
    pub evaluation: Option<EvaluationScore>,
    pub scoring_method: Option<ScoringMethod>,
    pub retry_count: u32,
    pub usage: Usage,
    pub cost_usd: f64,
    pub best: Option<Attempt>,
}

impl AgentState {
    pub fn new(query: &Query, default_engine: ScoringEngine) -> Self {
        let question = query.question.trim().to_string();

        Self {
            query_id: Uuid::new_v4(),
            original_question: question.clone(),
            question,
            engine: query.engine.unwrap_or(default_engine),
            sub_questions: Vec::new(),
            results: Vec::new(),
            degraded: Vec::new(),
            answer: String::new(),
            citations: Vec::new(),
            sources_used: 0,
            answer_provider: None,
            evaluation: None,
            scoring_method: None,
            retry_count: 0,
            usage: Usage::default(),
            cost_usd: 0.0,
            best: None,
        }
    }

    /// Add a generation's tokens and cost to the running totals
    pub fn absorb(&mut self, generation: &Generation) {
        self.usage.add(&generation.usage);
        self.cost_usd += generation.cost_usd;
    }

    pub fn note_degraded(&mut self, sources: &[RetrievalSource]) {
        for source in sources {
            if !self.degraded.contains(source) {
                self.degraded.push(*source);
            }
        }
    }

    /// Keep the current attempt if it beats the best so far. Returns whether
    /// it was kept.
    pub fn record_attempt(&mut self) -> bool {
        let (Some(score), Some(method)) = (self.evaluation.clone(), self.scoring_method) else {
            return false;
        };

        let improves = self
            .best
            .as_ref()
            .is_none_or(|best| score.combined > best.score.combined);

        if improves {
            self.best = Some(Attempt {
                answer: self.answer.clone(),
                citations: self.citations.clone(),
                score,
                method,
                sources_used: self.sources_used,
                provider: self.answer_provider.clone(),
                degraded: self.degraded.clone(),
            });
        }

        improves
    }

    /// Reset per-attempt fields for the next pass with a new question
    pub fn begin_retry(&mut self, question: String) {
        self.question = question;
        self.retry_count += 1;
        self.sub_questions.clear();
        self.results.clear();
        self.answer.clear();
        self.citations.clear();
        self.sources_used = 0;
        self.answer_provider = None;
        self.evaluation = None;
        self.scoring_method = None;
        self.degraded.clear();
    }

    /// Build the response from the best attempt
    pub fn into_response(self, latency_ms: u64, policy: &RetryPolicy) -> Option<QueryResponse> {
        let best = self.best?;

        Some(QueryResponse {
            query_id: self.query_id,
            low_confidence: best.score.combined < policy.eval_threshold,
            eval_score: best.score.combined,
            answer: best.answer,
            citations: best.citations,
            evaluation: best.score,
            scoring_method: best.method,
            sources_used: best.sources_used,
            latency_ms,
            retry_count: self.retry_count,
            provider_used: best.provider,
            usage: self.usage,
            cost_usd: self.cost_usd,
            degraded_sources: best.degraded,
        })
    }
}
