//! Infrastructure services

mod query_service;

pub use query_service::{QueryCacheConfig, QueryService};
