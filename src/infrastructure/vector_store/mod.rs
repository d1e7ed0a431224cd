//! Vector store implementations

mod in_memory;
mod qdrant;

pub use in_memory::InMemoryVectorStore;
pub use qdrant::{QdrantVectorStore, point_id};
