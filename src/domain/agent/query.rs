//! Query request and response contract

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainError;
use crate::domain::evaluation::{EvaluationScore, ScoringEngine, ScoringMethod};
use crate::domain::llm::Usage;
use crate::domain::retrieval::{Citation, RetrievalSource};

pub const MIN_QUESTION_CHARS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 2000;
pub const MAX_TOP_K: usize = 100;
pub const DEFAULT_TOP_K: usize = 10;

/// An immutable question for the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub question: String,
    /// Fused candidates kept per sub-question (1-100)
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<ScoringEngine>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Query {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: DEFAULT_TOP_K,
            engine: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_engine(mut self, engine: ScoringEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let length = self.question.trim().chars().count();

        if length < MIN_QUESTION_CHARS {
            return Err(DomainError::validation(format!(
                "Question must be at least {} characters",
                MIN_QUESTION_CHARS
            )));
        }

        if length > MAX_QUESTION_CHARS {
            return Err(DomainError::validation(format!(
                "Question must be at most {} characters",
                MAX_QUESTION_CHARS
            )));
        }

        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(DomainError::validation(format!(
                "top_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }

        Ok(())
    }
}

/// Final orchestrator output
///
/// A score below the threshold after exhausting retries is a valid response
/// flagged with `low_confidence`, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: Uuid,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub eval_score: f64,
    pub evaluation: EvaluationScore,
    pub scoring_method: ScoringMethod,
    pub sources_used: usize,
    pub latency_ms: u64,
    pub retry_count: u32,
    pub low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    pub usage: Usage,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_sources: Vec<RetrievalSource>,
}
