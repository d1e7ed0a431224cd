//! JSON corpus loading and seeding for development backends

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::DomainError;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::retrieval::{Entity, GraphIndex, Relation, VectorIndex, VectorPoint};

/// Default chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Documents plus the entity graph extracted from them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub documents: Vec<CorpusDocument>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Corpus {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::configuration(format!("Cannot read corpus {}: {}", path.display(), e))
        })?;

        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw)
            .map_err(|e| DomainError::validation(format!("Invalid corpus: {}", e)))
    }
}

/// Counts written by [`seed`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub documents: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relations: usize,
}

/// Pack whole sentences into chunks of at most `chunk_size` bytes.
/// A single sentence longer than the limit becomes its own chunk.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.unicode_sentences().map(str::trim).filter(|s| !s.is_empty()) {
        if !current.is_empty() && current.len() + 1 + sentence.len() > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Embed every document chunk into the vector index, then write the graph
pub async fn seed(
    corpus: &Corpus,
    embedder: &dyn EmbeddingProvider,
    vectors: &dyn VectorIndex,
    graph: &dyn GraphIndex,
    chunk_size: usize,
) -> Result<SeedReport, DomainError> {
    let mut ids = Vec::new();
    let mut texts = Vec::new();
    let mut owners = Vec::new();

    for document in &corpus.documents {
        for (index, chunk) in chunk_text(&document.text, chunk_size).into_iter().enumerate() {
            ids.push(format!("{}#{}", document.id, index));
            texts.push(chunk);
            owners.push(document);
        }
    }

    let vectors_out = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed_batch(&texts).await?
    };

    let points: Vec<VectorPoint> = ids
        .into_iter()
        .zip(texts)
        .zip(vectors_out)
        .zip(owners)
        .map(|(((id, text), vector), document)| {
            let mut point = VectorPoint::new(&id, vector)
                .with_payload("document_id", json!(document.id))
                .with_payload("chunk_id", json!(id))
                .with_payload("text", json!(text));
            if let Some(ref title) = document.title {
                point = point.with_payload("title", json!(title));
            }
            point
        })
        .collect();

    let chunks = if points.is_empty() {
        0
    } else {
        vectors.upsert(points).await?
    };
    let entities = graph.add_entities(corpus.entities.clone()).await?;
    let relations = graph.add_relations(corpus.relations.clone()).await?;

    let report = SeedReport {
        documents: corpus.documents.len(),
        chunks,
        entities,
        relations,
    };
    info!(
        documents = report.documents,
        chunks = report.chunks,
        entities = report.entities,
        relations = report.relations,
        "Corpus seeded"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::retrieval::{GraphStore, VectorStore};
    use crate::infrastructure::graph_store::InMemoryGraphStore;
    use crate::infrastructure::vector_store::InMemoryVectorStore;

    const CORPUS: &str = r#"{
        "documents": [
            { "id": "doc1", "title": "Kafka", "text": "Kafka is a distributed log." },
            { "id": "doc2", "text": "Zookeeper coordinates Kafka brokers." }
        ],
        "entities": [
            { "id": "kafka", "name": "Kafka", "description": "event streaming", "document_id": "doc1" },
            { "id": "zk", "name": "Zookeeper", "type": "system" }
        ],
        "relations": [
            { "source": "kafka", "target": "zk", "type": "DEPENDS_ON" },
            { "source": "kafka", "target": "nope", "type": "USES" }
        ]
    }"#;

    #[test]
    fn test_parse_corpus() {
        let corpus = Corpus::from_json(CORPUS).unwrap();

        assert_eq!(corpus.documents.len(), 2);
        assert_eq!(corpus.documents[0].title.as_deref(), Some("Kafka"));
        assert_eq!(corpus.entities[1].entity_type.as_deref(), Some("system"));
        assert_eq!(corpus.relations[0].relation_type, "DEPENDS_ON");
    }

    #[test]
    fn test_invalid_corpus_is_validation_error() {
        let error = Corpus::from_json("{\"documents\": 3}").unwrap_err();

        assert_eq!(error.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let error = Corpus::load("/nonexistent/corpus.json").unwrap_err();

        assert_eq!(error.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_chunk_text_packs_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";

        let chunks = chunk_text(text, 30);

        assert_eq!(chunks, vec!["One two three. Four five six.", "Seven eight nine."]);
        assert_eq!(chunk_text("short", 30), vec!["short"]);
        assert!(chunk_text("   ", 30).is_empty());
    }

    #[tokio::test]
    async fn test_seed_populates_both_stores() {
        let corpus = Corpus::from_json(CORPUS).unwrap();
        let embedder = MockEmbeddingProvider::new(16);
        let vectors = InMemoryVectorStore::new();
        let graph = InMemoryGraphStore::new();

        let report = seed(&corpus, &embedder, &vectors, &graph, DEFAULT_CHUNK_SIZE)
            .await
            .unwrap();

        assert_eq!(
            report,
            SeedReport {
                documents: 2,
                chunks: 2,
                entities: 2,
                relations: 1
            }
        );
        assert_eq!(embedder.batch_count(), 1);

        let hits = vectors
            .search(&embedder.vector_for("Kafka is a distributed log."), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "doc1#0");
        assert_eq!(hits[0].payload["document_id"], "doc1");
        assert_eq!(hits[0].payload["title"], "Kafka");

        let seeds = graph.find_entities("Is Kafka fast?", 5).await.unwrap();
        assert_eq!(seeds, vec!["kafka"]);
    }

    #[tokio::test]
    async fn test_seed_empty_corpus_skips_embedding() {
        let embedder = MockEmbeddingProvider::new(16);

        let report = seed(
            &Corpus::default(),
            &embedder,
            &InMemoryVectorStore::new(),
            &InMemoryGraphStore::new(),
            DEFAULT_CHUNK_SIZE,
        )
        .await
        .unwrap();

        assert_eq!(report, SeedReport::default());
        assert_eq!(embedder.batch_count(), 0);
    }
}
