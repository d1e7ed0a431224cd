//! Planner - decomposes a question into retrieval sub-questions

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use super::prompts::PLANNER_SYSTEM;
use crate::domain::llm::LlmRequest;
use crate::domain::routing::{Generation, ProviderRouter};

/// Leading list markers: "1.", "2)", "-", "*", "•"
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap());

pub const MAX_SUB_QUESTIONS: usize = 4;

#[derive(Debug, Clone)]
pub struct Plan {
    /// 1 to 4 sub-questions
    pub sub_questions: Vec<String>,
    pub generation: Option<Generation>,
}

#[derive(Debug)]
pub struct Planner {
    router: Arc<ProviderRouter>,
}

impl Planner {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }

    /// Never fails: provider failure plans the question unchanged
    pub async fn plan(&self, question: &str) -> Plan {
        let request = LlmRequest::instructed(
            PLANNER_SYSTEM,
            format!("Decompose this question:\n{}", question),
        );

        match self.router.generate(request).await {
            Ok(generation) => {
                let sub_questions = parse_sub_questions(&generation.text, question);
                info!(count = sub_questions.len(), "Planned sub-questions");
                Plan {
                    sub_questions,
                    generation: Some(generation),
                }
            }
            Err(e) => {
                warn!(error = %e, "Planning failed, using the original question");
                Plan {
                    sub_questions: vec![question.to_string()],
                    generation: None,
                }
            }
        }
    }
}

/// One sub-question per non-empty line, list markers removed, capped at 4.
/// A single line means no decomposition: the original question is kept.
pub fn parse_sub_questions(raw: &str, question: &str) -> Vec<String> {
    let mut sub_questions: Vec<String> = Vec::new();

    for line in raw.lines() {
        let cleaned = LIST_MARKER.replace(line, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() || sub_questions.iter().any(|q| q == cleaned) {
            continue;
        }
        sub_questions.push(cleaned.to_string());
    }

    if sub_questions.len() <= 1 {
        return vec![question.to_string()];
    }

    sub_questions.truncate(MAX_SUB_QUESTIONS);
    sub_questions
}
