//! Evaluation scores and judge output parsing

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const RELEVANCY_WEIGHT: f64 = 0.4;
pub const GROUNDEDNESS_WEIGHT: f64 = 0.4;
pub const COMPLETENESS_WEIGHT: f64 = 0.2;

/// Which scorer produced an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringEngine {
    /// LLM-as-judge, falling back to the heuristic on unparseable output
    #[default]
    Judge,
    /// Deterministic heuristic only
    Heuristic,
}

impl ScoringEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Judge => "judge",
            Self::Heuristic => "heuristic",
        }
    }
}

impl std::str::FromStr for ScoringEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "judge" | "llm" | "langgraph" => Ok(Self::Judge),
            "heuristic" | "crewai" => Ok(Self::Heuristic),
            other => Err(format!("unknown scoring engine '{}'", other)),
        }
    }
}

/// Three-dimension answer score. `combined` is always derived, never supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub relevancy: f64,
    pub groundedness: f64,
    pub completeness: f64,
    pub combined: f64,
    pub feedback: String,
}

impl EvaluationScore {
    /// Sub-scores are clamped to [0, 1] before combining
    pub fn new(
        relevancy: f64,
        groundedness: f64,
        completeness: f64,
        feedback: impl Into<String>,
    ) -> Self {
        let relevancy = clamp_unit(relevancy);
        let groundedness = clamp_unit(groundedness);
        let completeness = clamp_unit(completeness);

        Self {
            relevancy,
            groundedness,
            completeness,
            combined: combine(relevancy, groundedness, completeness),
            feedback: feedback.into(),
        }
    }

    pub fn zero(feedback: impl Into<String>) -> Self {
        Self::new(0.0, 0.0, 0.0, feedback)
    }

    pub fn passes(&self, threshold: f64) -> bool {
        self.combined >= threshold
    }
}

/// `0.4 * relevancy + 0.4 * groundedness + 0.2 * completeness`
pub fn combine(relevancy: f64, groundedness: f64, completeness: f64) -> f64 {
    RELEVANCY_WEIGHT * relevancy
        + GROUNDEDNESS_WEIGHT * groundedness
        + COMPLETENESS_WEIGHT * completeness
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Outcome of parsing judge output
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreParse {
    Parsed(EvaluationScore),
    Unparseable(String),
}

#[derive(Debug, Deserialize)]
struct JudgeScores {
    relevancy: f64,
    groundedness: f64,
    completeness: f64,
    #[serde(default)]
    feedback: String,
}

/// Parse judge output; any aggregate the model supplies is ignored.
pub fn parse_judge_output(raw: &str) -> ScoreParse {
    let json = extract_json(raw).unwrap_or(raw);

    match serde_json::from_str::<JudgeScores>(json) {
        Ok(scores) => ScoreParse::Parsed(EvaluationScore::new(
            scores.relevancy,
            scores.groundedness,
            scores.completeness,
            scores.feedback,
        )),
        Err(e) => {
            warn!(error = %e, response = %truncate(raw, 200), "Unparseable judge output");
            ScoreParse::Unparseable(raw.to_string())
        }
    }
}

/// Extract the outermost JSON object (handles markdown code fences)
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
