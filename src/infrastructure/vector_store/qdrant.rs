//! Qdrant vector store over the REST API

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::DomainError;
use crate::domain::retrieval::{VectorHit, VectorIndex, VectorPoint, VectorStore};
use crate::infrastructure::http_client::{HttpClientTrait, HttpError};

const STORE_NAME: &str = "qdrant";

/// Payload key holding the caller's point id; Qdrant only accepts integer or UUID ids
const ORIGINAL_ID_KEY: &str = "point_id";

#[derive(Debug)]
pub struct QdrantVectorStore<C: HttpClientTrait> {
    client: C,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl<C: HttpClientTrait> QdrantVectorStore<C> {
    pub fn new(client: C, base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        )
    }

    fn points_url(&self) -> String {
        format!("{}/collections/{}/points?wait=true", self.base_url, self.collection)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![("Content-Type", "application/json")];
        if let Some(ref key) = self.api_key {
            headers.push(("api-key", key.as_str()));
        }
        headers
    }

    fn translate(error: HttpError) -> DomainError {
        DomainError::store(STORE_NAME, error.to_string())
    }
}

/// Stable numeric point id derived from an arbitrary string id
pub fn point_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) >> 1
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl<C: HttpClientTrait> VectorStore for QdrantVectorStore<C> {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, DomainError> {
        let body = serde_json::json!({
            "vector": embedding,
            "limit": top_k,
            "with_payload": true,
        });

        let response = match self
            .client
            .post_json(&self.search_url(), self.headers(), &body)
            .await
        {
            Ok(response) => response,
            Err(e) if e.status() == Some(404) => {
                warn!(collection = %self.collection, "Collection not found, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Self::translate(e)),
        };

        let response: QdrantSearchResponse = serde_json::from_value(response).map_err(|e| {
            DomainError::store(STORE_NAME, format!("Failed to parse search response: {}", e))
        })?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let mut payload = point.payload.unwrap_or_default();
                let id = match payload.remove(ORIGINAL_ID_KEY) {
                    Some(Value::String(original)) => original,
                    _ => id_to_string(&point.id),
                };
                VectorHit {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> VectorIndex for QdrantVectorStore<C> {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, DomainError> {
        let count = points.len();
        let points: Vec<Value> = points
            .into_iter()
            .map(|point| {
                let mut payload = point.payload;
                payload.insert(ORIGINAL_ID_KEY.to_string(), Value::String(point.id.clone()));
                serde_json::json!({
                    "id": point_id(&point.id),
                    "vector": point.vector,
                    "payload": payload,
                })
            })
            .collect();

        self.client
            .put_json(
                &self.points_url(),
                self.headers(),
                &serde_json::json!({ "points": points }),
            )
            .await
            .map_err(Self::translate)?;

        Ok(count)
    }
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantScoredPoint {
    id: Value,
    score: f32,
    payload: Option<HashMap<String, Value>>,
}
