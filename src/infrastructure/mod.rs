//! Infrastructure layer - External service implementations

pub mod corpus;
pub mod embedding;
pub mod graph_store;
pub mod http_client;
pub mod llm;
pub mod logging;
pub mod services;
pub mod vector_store;
