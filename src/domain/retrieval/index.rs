//! Write side of the retrieval stores, used to seed a corpus

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::DomainError;

/// A chunk embedding with its payload (`document_id`, `chunk_id`, `text`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

impl VectorPoint {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: HashMap::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// A named graph entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Document the entity was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            entity_type: None,
            document_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// A directed, typed edge between two entity ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
}

impl Relation {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
        }
    }
}

/// Render an entity for retrieval: `"name: description [src -TYPE-> tgt]"`
pub fn render_entity(
    name: &str,
    description: &str,
    relation: Option<(&str, &str, &str)>,
) -> String {
    let mut text = if description.is_empty() {
        name.to_string()
    } else {
        format!("{}: {}", name, description)
    };

    if let Some((source, relation_type, target)) = relation {
        if !relation_type.is_empty() {
            text.push_str(&format!(" [{} -{}-> {}]", source, relation_type, target));
        }
    }

    text
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace points by id; returns the number written
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, DomainError>;
}

#[async_trait]
pub trait GraphIndex: Send + Sync {
    async fn add_entities(&self, entities: Vec<Entity>) -> Result<usize, DomainError>;

    /// Relations naming unknown entities are skipped
    async fn add_relations(&self, relations: Vec<Relation>) -> Result<usize, DomainError>;
}
