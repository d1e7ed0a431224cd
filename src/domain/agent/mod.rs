//! Agent layer: query contract, per-query state and the orchestrator

mod orchestrator;
mod planner;
mod prompts;
mod query;
mod rewriter;
mod state;
mod synthesizer;

pub use orchestrator::{AnswerStream, Orchestrator, OrchestratorConfig};
pub use planner::{MAX_SUB_QUESTIONS, Plan, Planner, parse_sub_questions};
pub use prompts::{INSUFFICIENT_INFORMATION, PLANNER_SYSTEM, REWRITER_SYSTEM, SYNTHESIZER_SYSTEM};
pub use query::{
    DEFAULT_TOP_K, MAX_QUESTION_CHARS, MAX_TOP_K, MIN_QUESTION_CHARS, Query, QueryResponse,
};
pub use rewriter::{Rewrite, Rewriter, fallback_rewrite};
pub use state::{AgentState, Attempt, Stage, transition};
pub use synthesizer::{Synthesis, Synthesizer, build_request};
