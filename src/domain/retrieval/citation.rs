//! Inline `[Source: id]` citations

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::result::{FusedResult, RetrievalSource};

static SOURCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Source:\s*([^\]]+)\]").unwrap());

const SNIPPET_CHARS: usize = 200;

/// A reference from the answer back to one retrieved candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub chunk_id: String,
    pub text_snippet: String,
    pub source: RetrievalSource,
}

impl Citation {
    pub fn from_result(result: &FusedResult) -> Self {
        Self {
            document_id: result.document_id().to_string(),
            chunk_id: result.chunk_id().to_string(),
            text_snippet: result.text().chars().take(SNIPPET_CHARS).collect(),
            source: result.result.source,
        }
    }
}

/// Ids named in `[Source: ...]` markers, in order of first appearance.
/// One marker may list several ids separated by commas or semicolons.
pub fn extract_source_ids(answer: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();

    for capture in SOURCE_PATTERN.captures_iter(answer) {
        for id in capture[1].split([',', ';']).map(str::trim) {
            if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
    }

    ids
}

/// The answer text without its `[Source: ...]` markers
pub fn strip_source_markers(answer: &str) -> String {
    SOURCE_PATTERN.replace_all(answer, "").into_owned()
}

/// Citations for every result the answer names by chunk or document id.
/// Ids that match no retrieved result are dropped.
pub fn cite(answer: &str, results: &[FusedResult]) -> Vec<Citation> {
    let ids = extract_source_ids(answer);
    if ids.is_empty() {
        return Vec::new();
    }

    results
        .iter()
        .filter(|result| {
            ids.iter()
                .any(|id| id == result.chunk_id() || id == result.document_id())
        })
        .map(Citation::from_result)
        .collect()
}
