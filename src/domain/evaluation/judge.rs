//! Answer scoring trait and the LLM-as-judge implementation

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::score::{ScoreParse, parse_judge_output};
use crate::domain::DomainError;
use crate::domain::llm::LlmRequest;
use crate::domain::retrieval::FusedResult;
use crate::domain::routing::{Generation, ProviderRouter};

const JUDGE_SYSTEM: &str = "You are an answer quality evaluator. Given a question, an answer, and
the source documents, evaluate the answer on three dimensions.

Score each dimension from 0.0 to 1.0:
1. relevancy: Does the answer address the question?
2. groundedness: Is every claim in the answer supported by the documents?
3. completeness: Does the answer cover all aspects of the question?

Return ONLY valid JSON (no markdown, no explanation):
{\"relevancy\": 0.0, \"groundedness\": 0.0, \"completeness\": 0.0, \"feedback\": \"brief feedback\"}";

/// Documents shown to the judge
const JUDGE_DOCUMENTS: usize = 5;
/// Characters per judged document
const JUDGE_SNIPPET_CHARS: usize = 300;

/// Scorer output plus the generation that produced it, if any
#[derive(Debug, Clone)]
pub struct ScoredAnswer {
    pub parse: ScoreParse,
    pub generation: Option<Generation>,
}

/// One way of scoring an answer against its retrieved context
#[async_trait]
pub trait AnswerScorer: Send + Sync + Debug {
    async fn score(
        &self,
        question: &str,
        answer: &str,
        results: &[FusedResult],
    ) -> Result<ScoredAnswer, DomainError>;

    fn scorer_name(&self) -> &'static str;
}

/// LLM-as-judge through the provider router
#[derive(Debug)]
pub struct LlmJudgeScorer {
    router: Arc<ProviderRouter>,
}

impl LlmJudgeScorer {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }

    fn build_request(question: &str, answer: &str, results: &[FusedResult]) -> LlmRequest {
        let snippets = results
            .iter()
            .take(JUDGE_DOCUMENTS)
            .map(|r| r.text().chars().take(JUDGE_SNIPPET_CHARS).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n---\n");

        LlmRequest::instructed(
            JUDGE_SYSTEM,
            format!(
                "Question: {}\n\nAnswer: {}\n\nSource Documents:\n{}",
                question, answer, snippets
            ),
        )
        .with_temperature(0.0)
    }
}

#[async_trait]
impl AnswerScorer for LlmJudgeScorer {
    async fn score(
        &self,
        question: &str,
        answer: &str,
        results: &[FusedResult],
    ) -> Result<ScoredAnswer, DomainError> {
        let request = Self::build_request(question, answer, results);
        let generation = self.router.generate(request).await?;

        let parse = parse_judge_output(generation.text.trim());
        debug!(
            provider = %generation.provider,
            parsed = matches!(parse, ScoreParse::Parsed(_)),
            "Judge responded"
        );

        Ok(ScoredAnswer {
            parse,
            generation: Some(generation),
        })
    }

    fn scorer_name(&self) -> &'static str {
        "llm_judge"
    }
}
