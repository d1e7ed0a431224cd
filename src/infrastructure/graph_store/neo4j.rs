//! Neo4j graph store over the HTTP transactional endpoint

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::DomainError;
use crate::domain::retrieval::{
    Entity, GraphIndex, GraphNode, GraphStore, Relation, render_entity,
};
use crate::infrastructure::http_client::HttpClientTrait;

const STORE_NAME: &str = "neo4j";

const FIND_ENTITIES: &str = "MATCH (e:Entity) \
     WHERE size(e.name) >= 2 AND toLower($text) CONTAINS toLower(e.name) \
     RETURN e.id AS id \
     ORDER BY size(e.name) DESC, e.id \
     LIMIT $limit";

const ADD_ENTITIES: &str = "UNWIND $entities AS e \
     MERGE (n:Entity {id: e.id}) \
     SET n.name = e.name, n.description = e.description, \
         n.type = e.type, n.document_id = e.document_id";

const ADD_RELATIONS: &str = "UNWIND $relations AS r \
     MATCH (a:Entity {id: r.source}), (b:Entity {id: r.target}) \
     MERGE (a)-[x:RELATED {type: r.type}]->(b) \
     RETURN count(x) AS added";

/// Variable-length bounds cannot be parameters, so the hop count is inlined
fn expand_statement(hops: u32) -> String {
    format!(
        "MATCH (seed:Entity) WHERE seed.id IN $ids \
         MATCH path = (seed)-[*0..{hops}]-(node:Entity) \
         WITH node, min(length(path)) AS hops \
         OPTIONAL MATCH (node)-[rel]-(:Entity) \
         WITH node, hops, head(collect(rel)) AS rel \
         RETURN node.id, node.name, node.description, node.document_id, hops, \
                coalesce(rel.type, type(rel)), startNode(rel).name, endNode(rel).name \
         ORDER BY hops, node.id"
    )
}

#[derive(Debug)]
pub struct Neo4jGraphStore<C: HttpClientTrait> {
    client: C,
    base_url: String,
    database: String,
    auth_header: String,
}

impl<C: HttpClientTrait> Neo4jGraphStore<C> {
    pub fn new(
        client: C,
        base_url: impl Into<String>,
        database: impl Into<String>,
        username: &str,
        password: &str,
    ) -> Self {
        let credentials = STANDARD.encode(format!("{}:{}", username, password));

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            auth_header: format!("Basic {}", credentials),
        }
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
            ("Accept", "application/json"),
        ]
    }

    /// Run one statement and return its rows
    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>, DomainError> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let response = self
            .client
            .post_json(&self.commit_url(), self.headers(), &body)
            .await
            .map_err(|e| DomainError::store(STORE_NAME, e.to_string()))?;

        let response: TxResponse = serde_json::from_value(response).map_err(|e| {
            DomainError::store(STORE_NAME, format!("Failed to parse response: {}", e))
        })?;

        if let Some(error) = response.errors.into_iter().next() {
            return Err(DomainError::store(
                STORE_NAME,
                format!("{}: {}", error.code, error.message),
            ));
        }

        Ok(response
            .results
            .into_iter()
            .next()
            .map(|result| result.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default())
    }
}

fn text_at(row: &[Value], index: usize) -> &str {
    row.get(index).and_then(Value::as_str).unwrap_or_default()
}

fn node_from_row(row: &[Value]) -> Option<GraphNode> {
    let id = row.first()?.as_str()?;
    let name = text_at(row, 1);
    let description = text_at(row, 2);
    let hops = row.get(4).and_then(Value::as_u64).unwrap_or(0);
    let relation = (text_at(row, 6), text_at(row, 5), text_at(row, 7));

    let mut node = GraphNode::new(id, render_entity(name, description, Some(relation)))
        .with_metadata("hops", json!(hops))
        .with_metadata("name", json!(name));

    if !relation.1.is_empty() {
        node = node
            .with_metadata("rel_type", json!(relation.1))
            .with_metadata("rel_source", json!(relation.0))
            .with_metadata("rel_target", json!(relation.2));
    }
    if let Some(document_id) = row.get(3).and_then(Value::as_str) {
        node = node.with_metadata("document_id", json!(document_id));
    }

    Some(node)
}

#[async_trait]
impl<C: HttpClientTrait> GraphStore for Neo4jGraphStore<C> {
    async fn find_entities(&self, text: &str, limit: usize) -> Result<Vec<String>, DomainError> {
        let rows = self
            .run(FIND_ENTITIES, json!({ "text": text, "limit": limit }))
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    async fn expand(&self, seeds: &[String], hops: u32) -> Result<Vec<GraphNode>, DomainError> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .run(&expand_statement(hops), json!({ "ids": seeds }))
            .await?;

        Ok(rows.iter().filter_map(|row| node_from_row(row)).collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> GraphIndex for Neo4jGraphStore<C> {
    async fn add_entities(&self, entities: Vec<Entity>) -> Result<usize, DomainError> {
        let count = entities.len();
        self.run(ADD_ENTITIES, json!({ "entities": entities })).await?;
        Ok(count)
    }

    async fn add_relations(&self, relations: Vec<Relation>) -> Result<usize, DomainError> {
        let rows = self
            .run(ADD_RELATIONS, json!({ "relations": relations }))
            .await?;

        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}
