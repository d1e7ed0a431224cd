//! Deterministic answer scorer
//!
//! Used directly for the `heuristic` engine and as the fallback whenever the
//! judge's output cannot be parsed.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::judge::{AnswerScorer, ScoredAnswer};
use super::score::{EvaluationScore, ScoreParse};
use crate::domain::DomainError;
use crate::domain::retrieval::{FusedResult, extract_source_ids, strip_source_markers};

static ABSTENTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(could not find|couldn't find|insufficient information|not enough information|no relevant information)",
    )
    .unwrap()
});

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "was", "were", "has",
    "have", "had", "its", "this", "that", "with", "from", "what", "which", "who", "whom", "how",
    "why", "when", "where", "does", "did", "into", "about", "than", "then", "them", "they", "their",
    "there", "these", "those", "will", "would", "should", "could", "been", "being", "also",
];

/// Answer length (in words) that counts as fully complete
const COMPLETE_ANSWER_WORDS: usize = 60;

/// Citations needed for a full citation ratio
const EXPECTED_CITATIONS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    /// Keyword overlap, citation ratio and answer length
    pub fn evaluate(
        &self,
        question: &str,
        answer: &str,
        results: &[FusedResult],
    ) -> EvaluationScore {
        if answer.trim().is_empty() {
            return EvaluationScore::zero("No answer to evaluate");
        }

        let cited_ids = extract_source_ids(answer);
        let answer = strip_source_markers(answer);
        let answer = answer.as_str();
        let question_terms = terms(question);
        let answer_terms = terms(answer);
        let word_count = answer.unicode_words().count();

        let relevancy = if question_terms.is_empty() {
            1.0
        } else {
            overlap(&question_terms, &answer_terms)
        };

        let (groundedness, citation_ratio) = if results.is_empty() {
            let abstained = ABSTENTION_PATTERN.is_match(answer);
            (if abstained { 1.0 } else { 0.0 }, 0.0)
        } else {
            let ratio = citation_ratio(&cited_ids, results);
            let context_terms: HashSet<String> =
                results.iter().flat_map(|r| terms(r.text())).collect();
            let support = if answer_terms.is_empty() {
                0.0
            } else {
                overlap(&answer_terms, &context_terms)
            };
            (0.5 * ratio + 0.5 * support, ratio)
        };

        let completeness = (word_count as f64 / COMPLETE_ANSWER_WORDS as f64).min(1.0);

        let mut feedback = Vec::new();
        if relevancy < 0.5 {
            let mut missing: Vec<&str> = question_terms
                .iter()
                .filter(|t| !answer_terms.contains(*t))
                .map(String::as_str)
                .collect();
            missing.sort_unstable();
            feedback.push(format!("Address the question's key terms: {}", missing.join(", ")));
        }
        if !results.is_empty() && citation_ratio < 0.5 {
            feedback.push("Cite the supporting documents with [Source: id]".to_string());
        }
        if completeness < 0.5 {
            feedback.push("Expand the answer with more detail from the sources".to_string());
        }
        if feedback.is_empty() {
            feedback.push("Heuristic evaluation found no major issues".to_string());
        }

        EvaluationScore::new(relevancy, groundedness, completeness, feedback.join("; "))
    }
}

#[async_trait]
impl AnswerScorer for HeuristicScorer {
    async fn score(
        &self,
        question: &str,
        answer: &str,
        results: &[FusedResult],
    ) -> Result<ScoredAnswer, DomainError> {
        Ok(ScoredAnswer {
            parse: ScoreParse::Parsed(self.evaluate(question, answer, results)),
            generation: None,
        })
    }

    fn scorer_name(&self) -> &'static str {
        "heuristic"
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Share of `of` that also appears in `within`
fn overlap(of: &HashSet<String>, within: &HashSet<String>) -> f64 {
    if of.is_empty() {
        return 0.0;
    }
    of.intersection(within).count() as f64 / of.len() as f64
}

fn citation_ratio(ids: &[String], results: &[FusedResult]) -> f64 {
    let cited = results
        .iter()
        .filter(|r| {
            ids.iter()
                .any(|id| id == r.chunk_id() || id == r.document_id())
        })
        .count();
    let expected = results.len().min(EXPECTED_CITATIONS);

    (cited as f64 / expected as f64).min(1.0)
}
