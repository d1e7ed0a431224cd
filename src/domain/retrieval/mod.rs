//! Hybrid retrieval: vector search, graph expansion and rank fusion

mod citation;
mod fusion;
mod hybrid;
mod index;
mod result;
mod store;

pub use citation::{Citation, cite, extract_source_ids, strip_source_markers};
pub use fusion::{DEFAULT_RRF_K, merge_fused, reciprocal_rank_fusion};
pub use hybrid::{HybridRetriever, RetrievalConfig, RetrievalOutcome};
pub use index::{Entity, GraphIndex, Relation, VectorIndex, VectorPoint, render_entity};
pub use result::{FusedResult, RetrievalResult, RetrievalSource};
pub use store::{GraphNode, GraphStore, VectorHit, VectorStore};

#[cfg(test)]
pub use store::{MockGraphStore, MockVectorStore};
