//! Evaluator - scores answers and applies the accept/retry rule

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::heuristic::HeuristicScorer;
use super::judge::AnswerScorer;
use super::score::{EvaluationScore, ScoreParse, ScoringEngine};
use crate::domain::DomainError;
use crate::domain::retrieval::FusedResult;
use crate::domain::routing::Generation;

/// Accept/retry thresholds
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub eval_threshold: f64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            eval_threshold: 0.7,
            max_retries: 2,
        }
    }
}

impl RetryPolicy {
    /// Accept when the score passes or retries are used up
    pub fn decide(&self, combined: f64, retry_count: u32) -> Decision {
        if combined >= self.eval_threshold || retry_count >= self.max_retries {
            Decision::Accept
        } else {
            Decision::Retry
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Retry,
}

/// How a score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Judge,
    /// Judge output was unparseable
    HeuristicFallback,
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub score: EvaluationScore,
    pub method: ScoringMethod,
    /// Judge generation, for usage accounting
    pub generation: Option<Generation>,
}

#[derive(Debug)]
pub struct Evaluator {
    judge: Arc<dyn AnswerScorer>,
    heuristic: HeuristicScorer,
    policy: RetryPolicy,
}

impl Evaluator {
    pub fn new(judge: Arc<dyn AnswerScorer>, policy: RetryPolicy) -> Self {
        Self {
            judge,
            heuristic: HeuristicScorer::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Score an answer. Only provider exhaustion is an error; unparseable
    /// judge output falls back to the heuristic.
    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        results: &[FusedResult],
        engine: ScoringEngine,
    ) -> Result<Evaluation, DomainError> {
        if answer.trim().is_empty() {
            return Ok(Evaluation {
                score: EvaluationScore::zero("No answer to evaluate"),
                method: ScoringMethod::Heuristic,
                generation: None,
            });
        }

        let evaluation = match engine {
            ScoringEngine::Heuristic => Evaluation {
                score: self.heuristic.evaluate(question, answer, results),
                method: ScoringMethod::Heuristic,
                generation: None,
            },
            ScoringEngine::Judge => {
                let scored = self.judge.score(question, answer, results).await?;
                match scored.parse {
                    ScoreParse::Parsed(score) => Evaluation {
                        score,
                        method: ScoringMethod::Judge,
                        generation: scored.generation,
                    },
                    ScoreParse::Unparseable(_) => {
                        warn!(
                            scorer = self.judge.scorer_name(),
                            "Falling back to heuristic scoring"
                        );
                        Evaluation {
                            score: self.heuristic.evaluate(question, answer, results),
                            method: ScoringMethod::HeuristicFallback,
                            generation: scored.generation,
                        }
                    }
                }
            }
        };

        info!(
            combined = evaluation.score.combined,
            method = ?evaluation.method,
            "Answer evaluated"
        );

        Ok(evaluation)
    }

    pub fn decide(&self, score: &EvaluationScore, retry_count: u32) -> Decision {
        self.policy.decide(score.combined, retry_count)
    }
}
