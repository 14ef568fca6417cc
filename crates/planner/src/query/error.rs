use thiserror::Error;

/// Errors raised while parsing a paginated query template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A required placeholder does not appear in the template.
    #[error("Template is missing the {{{0}}} placeholder")]
    MissingPlaceholder(&'static str),

    /// A placeholder appears more than once.
    #[error("Template contains the {{{0}}} placeholder more than once")]
    DuplicatePlaceholder(&'static str),

    /// A `{name}` other than `{offset}` or `{limit}`.
    #[error("Unknown placeholder {{{0}}}; use {{{{ and }}}} for literal braces")]
    UnknownPlaceholder(String),

    /// A `{` without a closing `}`.
    #[error("Unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    /// A lone `}` outside of a placeholder.
    #[error("Unmatched closing brace at byte {0}")]
    UnmatchedBrace(usize),
}

/// Errors raised while composing an enrichment query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("Base query is empty")]
    EmptyBaseQuery,

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Enrichment alias '{0}' is used more than once")]
    DuplicateAlias(String),

    #[error("Enrichment expression for '{0}' is empty")]
    EmptyExpression(String),

    #[error("Composed query is not a valid template: {0}")]
    Template(#[from] TemplateError),
}
