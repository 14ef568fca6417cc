use connectors::sql::base::error::{ConnectorError, DbError};
use planner::query::error::{EnrichmentError, TemplateError};
use thiserror::Error;

/// Terminal failure of a page sequence.
///
/// Driver errors keep their identity: a retried failure surfaces as the
/// same variant the last attempt produced.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Connection failure: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Query execution failure: {0}")]
    Query(#[from] DbError),

    #[error("Invalid query template: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid enrichment query: {0}")]
    Enrichment(#[from] EnrichmentError),

    /// A partitioned worker task panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode cache entry: {0}")]
    Encode(String),

    #[error("Failed to decode cache entry: {0}")]
    Decode(String),
}
