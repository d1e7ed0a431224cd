//! In-memory vector store for development and testing

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::DomainError;
use crate::domain::embedding::cosine_similarity;
use crate::domain::retrieval::{VectorHit, VectorIndex, VectorPoint, VectorStore};

/// Brute-force cosine index
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    points: Arc<RwLock<Vec<VectorPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, DomainError> {
        let points = self.points.read().await;

        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|point| point.vector.len() == embedding.len())
            .map(|point| VectorHit {
                id: point.id.clone(),
                score: cosine_similarity(embedding, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);

        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, DomainError> {
        let mut stored = self.points.write().await;
        let count = points.len();

        for point in points {
            match stored.iter_mut().find(|existing| existing.id == point.id) {
                Some(existing) => *existing = point,
                None => stored.push(point),
            }
        }

        Ok(count)
    }
}
