//! Rewriter - turns evaluator feedback into a sharper retrieval question

use std::sync::Arc;

use tracing::{debug, warn};

use super::prompts::REWRITER_SYSTEM;
use crate::domain::llm::LlmRequest;
use crate::domain::routing::{Generation, ProviderRouter};

#[derive(Debug, Clone)]
pub struct Rewrite {
    pub question: String,
    pub generation: Option<Generation>,
}

#[derive(Debug)]
pub struct Rewriter {
    router: Arc<ProviderRouter>,
}

impl Rewriter {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }

    /// Never fails: without a usable completion the question and feedback
    /// are combined deterministically.
    pub async fn rewrite(&self, question: &str, feedback: &str) -> Rewrite {
        let request = LlmRequest::instructed(
            REWRITER_SYSTEM,
            format!("Original: {}\nFeedback: {}", question, feedback),
        );

        match self.router.generate(request).await {
            Ok(generation) => {
                let rewritten = generation
                    .text
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string);

                let question = rewritten.unwrap_or_else(|| fallback_rewrite(question, feedback));
                debug!(rewritten = %question, "Question rewritten");
                Rewrite {
                    question,
                    generation: Some(generation),
                }
            }
            Err(e) => {
                warn!(error = %e, "Rewrite failed, combining question with feedback");
                Rewrite {
                    question: fallback_rewrite(question, feedback),
                    generation: None,
                }
            }
        }
    }
}

pub fn fallback_rewrite(question: &str, feedback: &str) -> String {
    let feedback = feedback.trim();
    if feedback.is_empty() {
        question.to_string()
    } else {
        format!("{} (focus: {})", question, feedback)
    }
}
