//! Graph store implementations

mod in_memory;
mod neo4j;

pub use in_memory::InMemoryGraphStore;
pub use neo4j::Neo4jGraphStore;
