use connectors::sql::base::error::{ConnectorError, DbError};
use engine_config::settings::error::SettingsError;
use engine_core::error::{CacheError, PageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Pagination failed: {0}")]
    Pagination(#[from] PageError),

    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Query failed: {0}")]
    Query(#[from] DbError),

    #[error("Failed to open page cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("{0} of {1} ranges failed")]
    RangesFailed(usize, usize),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
