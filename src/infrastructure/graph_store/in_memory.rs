//! In-memory property graph for development and testing

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use crate::domain::DomainError;
use crate::domain::retrieval::{
    Entity, GraphIndex, GraphNode, GraphStore, Relation, render_entity,
};

/// Entity names shorter than this never seed expansion
const MIN_NAME_CHARS: usize = 2;

#[derive(Debug, Default)]
struct Graph {
    entities: HashMap<String, Entity>,
    relations: Vec<Relation>,
    /// entity id -> indices into `relations`, both directions
    adjacency: HashMap<String, Vec<usize>>,
}

impl Graph {
    fn neighbours<'a>(&'a self, id: &str) -> impl Iterator<Item = (&'a Relation, &'a str)> + 'a {
        let id = id.to_string();
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&index| {
                let relation = &self.relations[index];
                let other = if relation.source == id {
                    relation.target.as_str()
                } else {
                    relation.source.as_str()
                };
                (relation, other)
            })
    }

    fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.entities.get(id).map_or(id, |e| e.name.as_str())
    }

    fn node(&self, entity: &Entity, hops: u32, via: Option<&Relation>) -> GraphNode {
        let via = via.or_else(|| self.neighbours(&entity.id).next().map(|(r, _)| r));
        let rendered = via.map(|r| {
            (
                self.name_of(&r.source),
                r.relation_type.as_str(),
                self.name_of(&r.target),
            )
        });

        let mut node = GraphNode::new(
            &entity.id,
            render_entity(&entity.name, &entity.description, rendered),
        )
        .with_metadata("hops", json!(hops))
        .with_metadata("name", json!(entity.name));

        if let Some((source, relation_type, target)) = rendered {
            node = node
                .with_metadata("rel_type", json!(relation_type))
                .with_metadata("rel_source", json!(source))
                .with_metadata("rel_target", json!(target));
        }
        if let Some(ref document_id) = entity.document_id {
            node = node.with_metadata("document_id", json!(document_id));
        }

        node
    }
}

/// Adjacency-list graph with breadth-first expansion
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entity_count(&self) -> usize {
        self.graph.read().await.entities.len()
    }

    pub async fn relation_count(&self) -> usize {
        self.graph.read().await.relations.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_entities(&self, text: &str, limit: usize) -> Result<Vec<String>, DomainError> {
        let graph = self.graph.read().await;
        let haystack = text.to_lowercase();

        let mut matches: Vec<&Entity> = graph
            .entities
            .values()
            .filter(|entity| entity.name.chars().count() >= MIN_NAME_CHARS)
            .filter(|entity| haystack.contains(&entity.name.to_lowercase()))
            .collect();

        // Longer names are more specific
        matches.sort_by(|a, b| {
            b.name
                .chars()
                .count()
                .cmp(&a.name.chars().count())
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(matches
            .into_iter()
            .take(limit)
            .map(|entity| entity.id.clone())
            .collect())
    }

    async fn expand(&self, seeds: &[String], hops: u32) -> Result<Vec<GraphNode>, DomainError> {
        let graph = self.graph.read().await;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, u32, Option<&Relation>)> = VecDeque::new();
        let mut nodes: Vec<(u32, GraphNode)> = Vec::new();

        for seed in seeds {
            if let Some(entity) = graph.entities.get(seed) {
                if visited.insert(entity.id.as_str()) {
                    queue.push_back((entity.id.as_str(), 0, None));
                }
            }
        }

        while let Some((id, depth, via)) = queue.pop_front() {
            let Some(entity) = graph.entities.get(id) else {
                continue;
            };
            nodes.push((depth, graph.node(entity, depth, via)));

            if depth >= hops {
                continue;
            }
            for (relation, other) in graph.neighbours(id) {
                if graph.entities.contains_key(other) && visited.insert(other) {
                    queue.push_back((other, depth + 1, Some(relation)));
                }
            }
        }

        nodes.sort_by(|(a_hops, a), (b_hops, b)| {
            a_hops.cmp(b_hops).then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        Ok(nodes.into_iter().map(|(_, node)| node).collect())
    }
}

#[async_trait]
impl GraphIndex for InMemoryGraphStore {
    async fn add_entities(&self, entities: Vec<Entity>) -> Result<usize, DomainError> {
        let mut graph = self.graph.write().await;
        let count = entities.len();

        for entity in entities {
            graph.entities.insert(entity.id.clone(), entity);
        }

        Ok(count)
    }

    async fn add_relations(&self, relations: Vec<Relation>) -> Result<usize, DomainError> {
        let mut graph = self.graph.write().await;
        let mut added = 0;

        for relation in relations {
            if !graph.entities.contains_key(&relation.source)
                || !graph.entities.contains_key(&relation.target)
            {
                tracing::warn!(
                    source = %relation.source,
                    target = %relation.target,
                    "Skipping relation with unknown entity"
                );
                continue;
            }

            let index = graph.relations.len();
            graph
                .adjacency
                .entry(relation.source.clone())
                .or_default()
                .push(index);
            if relation.target != relation.source {
                graph
                    .adjacency
                    .entry(relation.target.clone())
                    .or_default()
                    .push(index);
            }
            graph.relations.push(relation);
            added += 1;
        }

        Ok(added)
    }
}
