//! Vector and graph store collaborator traits

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::{RetrievalResult, RetrievalSource};
use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

const DOCUMENT_ID_KEY: &str = "document_id";
const CHUNK_ID_KEY: &str = "chunk_id";
const TEXT_KEY: &str = "text";

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    /// Cosine similarity
    pub score: f32,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

impl VectorHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            payload: HashMap::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn into_result(self) -> RetrievalResult {
        let document_id = string_field(&self.payload, DOCUMENT_ID_KEY).unwrap_or(&self.id);
        let chunk_id = string_field(&self.payload, CHUNK_ID_KEY).unwrap_or(&self.id);
        let text = string_field(&self.payload, TEXT_KEY).unwrap_or_default();

        RetrievalResult::new(
            document_id,
            chunk_id,
            text,
            self.score,
            RetrievalSource::Vector,
        )
    }
}

/// An entity reached by graph expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub entity_id: String,
    /// `"name: description [src -TYPE-> tgt]"` style rendering of the entity
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl GraphNode {
    pub fn new(entity_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Hop distance from the nearest seed (0 for seeds)
    pub fn hops(&self) -> u64 {
        self.metadata
            .get("hops")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Graph candidates are scored by proximity: `1 / (1 + hops)`
    pub fn into_result(self) -> RetrievalResult {
        let score = self
            .metadata
            .get("score")
            .and_then(Value::as_f64)
            .unwrap_or(1.0 / (1.0 + self.hops() as f64)) as f32;
        let document_id =
            string_field(&self.metadata, DOCUMENT_ID_KEY).unwrap_or(&self.entity_id);
        let chunk_id = string_field(&self.metadata, CHUNK_ID_KEY).unwrap_or(&self.entity_id);

        RetrievalResult::new(
            document_id,
            chunk_id,
            self.text.as_str(),
            score,
            RetrievalSource::Graph,
        )
    }
}

fn string_field<'a>(map: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Nearest-neighbour search over an embedding index
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Cosine search; an empty collection yields an empty list
    async fn search(&self, embedding: &[f32], top_k: usize)
    -> Result<Vec<VectorHit>, DomainError>;
}

/// Bounded traversal over a property graph
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Entity ids whose names occur in `text`, best matches first
    async fn find_entities(&self, text: &str, limit: usize) -> Result<Vec<String>, DomainError>;

    /// Entities within `hops` relationship steps of the seeds, seeds included.
    /// Empty seeds yield an empty list.
    async fn expand(&self, seeds: &[String], hops: u32) -> Result<Vec<GraphNode>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vector_hit_payload_identity() {
        let result = VectorHit::new("point-1", 0.9)
            .with_payload("document_id", json!("doc1"))
            .with_payload("chunk_id", json!("doc1#0"))
            .with_payload("text", json!("X is a thing"))
            .into_result();

        assert_eq!(result.identity(), ("doc1", "doc1#0"));
        assert_eq!(result.text, "X is a thing");
        assert_eq!(result.source, RetrievalSource::Vector);
    }

    #[test]
    fn test_vector_hit_without_payload_falls_back_to_id() {
        let result = VectorHit::new("doc2", 0.7).into_result();

        assert_eq!(result.identity(), ("doc2", "doc2"));
        assert_eq!(result.text, "");
    }

    #[test]
    fn test_graph_node_scored_by_hops() {
        let seed = GraphNode::new("e1", "X: a thing").into_result();
        let far = GraphNode::new("e2", "Y: another")
            .with_metadata("hops", json!(3))
            .into_result();

        assert_eq!(seed.score, 1.0);
        assert_eq!(far.score, 0.25);
        assert_eq!(far.source, RetrievalSource::Graph);
    }

    #[test]
    fn test_graph_node_document_metadata() {
        let result = GraphNode::new("e1", "X: a thing")
            .with_metadata("document_id", json!("doc2"))
            .into_result();

        assert_eq!(result.identity(), ("doc2", "e1"));
    }
}
