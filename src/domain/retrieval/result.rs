//! Retrieved and fused candidates

use serde::{Deserialize, Serialize};

/// Which retriever produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Vector,
    Graph,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
        }
    }
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved unit of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub document_id: String,
    pub chunk_id: String,
    pub text: String,
    /// Native score of the producing retriever (higher is better)
    pub score: f32,
    pub source: RetrievalSource,
}

impl RetrievalResult {
    pub fn new(
        document_id: impl Into<String>,
        chunk_id: impl Into<String>,
        text: impl Into<String>,
        score: f32,
        source: RetrievalSource,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_id: chunk_id.into(),
            text: text.into(),
            score,
            source,
        }
    }

    /// Stable identity used for deduplication
    pub fn identity(&self) -> (&str, &str) {
        (&self.document_id, &self.chunk_id)
    }
}

/// A candidate after rank fusion; unique by `(document_id, chunk_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    #[serde(flatten)]
    pub result: RetrievalResult,
    pub fused_score: f64,
    /// Every list the candidate appeared in
    pub sources: Vec<RetrievalSource>,
    /// Best (lowest, 1-based) rank across source lists
    #[serde(skip)]
    pub best_rank: usize,
}

impl FusedResult {
    pub fn document_id(&self) -> &str {
        &self.result.document_id
    }

    pub fn chunk_id(&self) -> &str {
        &self.result.chunk_id
    }

    pub fn text(&self) -> &str {
        &self.result.text
    }

    pub fn identity(&self) -> (&str, &str) {
        self.result.identity()
    }

    pub fn found_in(&self, source: RetrievalSource) -> bool {
        self.sources.contains(&source)
    }
}
