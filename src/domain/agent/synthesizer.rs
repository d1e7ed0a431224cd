//! Synthesizer - grounded, cited answers from fused context

use std::sync::Arc;

use tracing::info;

use super::prompts::{INSUFFICIENT_INFORMATION, SYNTHESIZER_SYSTEM};
use crate::domain::DomainError;
use crate::domain::llm::LlmRequest;
use crate::domain::retrieval::{Citation, FusedResult, cite};
use crate::domain::routing::{Generation, ProviderRouter};

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Context documents shown to the model
    pub sources_used: usize,
    pub generation: Option<Generation>,
}

#[derive(Debug)]
pub struct Synthesizer {
    router: Arc<ProviderRouter>,
    max_context_documents: usize,
}

impl Synthesizer {
    pub fn new(router: Arc<ProviderRouter>, max_context_documents: usize) -> Self {
        Self {
            router,
            max_context_documents: max_context_documents.max(1),
        }
    }

    /// Results that fit in the prompt, best first
    pub fn context<'a>(&self, results: &'a [FusedResult]) -> &'a [FusedResult] {
        &results[..results.len().min(self.max_context_documents)]
    }

    /// Empty results give the insufficient-information answer without an
    /// LLM call. Citations only ever name retrieved candidates.
    pub async fn synthesize(
        &self,
        question: &str,
        results: &[FusedResult],
    ) -> Result<Synthesis, DomainError> {
        if results.is_empty() {
            return Ok(Synthesis {
                answer: INSUFFICIENT_INFORMATION.to_string(),
                citations: Vec::new(),
                sources_used: 0,
                generation: None,
            });
        }

        let context = self.context(results);
        let generation = self.router.generate(build_request(question, context)).await?;
        let answer = generation.text.trim().to_string();
        let citations = cite(&answer, context);

        info!(
            citations = citations.len(),
            sources = context.len(),
            provider = %generation.provider,
            "Synthesized answer"
        );

        Ok(Synthesis {
            answer,
            citations,
            sources_used: context.len(),
            generation: Some(generation),
        })
    }
}

/// Synthesis prompt over the given context documents
pub fn build_request(question: &str, context: &[FusedResult]) -> LlmRequest {
    let documents = context
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "[Document {} | ID: {} | Source: {}]\n{}",
                i + 1,
                result.chunk_id(),
                result.document_id(),
                result.text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    LlmRequest::instructed(
        SYNTHESIZER_SYSTEM,
        format!("Question: {}\n\nDocuments:\n{}", question, documents),
    )
}
