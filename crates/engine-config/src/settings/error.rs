use planner::query::error::{EnrichmentError, TemplateError};
use thiserror::Error;

/// Errors raised while loading or validating pager settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// A `${VAR}` reference names a variable that is not set.
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Unterminated environment reference in: {0}")]
    UnterminatedEnvRef(String),

    #[error("Invalid query settings: {0}")]
    InvalidQuery(String),

    #[error("Invalid query template: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid enrichment query: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Invalid setting `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
