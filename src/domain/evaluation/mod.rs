//! Answer evaluation: LLM-as-judge with a deterministic heuristic fallback

mod evaluator;
mod heuristic;
mod judge;
mod score;

pub use evaluator::{Decision, Evaluation, Evaluator, RetryPolicy, ScoringMethod};
pub use heuristic::HeuristicScorer;
pub use judge::{AnswerScorer, LlmJudgeScorer, ScoredAnswer};
pub use score::{
    COMPLETENESS_WEIGHT, EvaluationScore, GROUNDEDNESS_WEIGHT, RELEVANCY_WEIGHT, ScoreParse,
    ScoringEngine, combine, parse_judge_output,
};
