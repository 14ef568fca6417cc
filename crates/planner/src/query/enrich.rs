//! Composition of a base query with caller-supplied enrichment expressions.

use crate::query::{
    dialect::Dialect,
    error::EnrichmentError,
    template::{BoundQuery, QueryTemplate, escape_braces},
};
use std::collections::HashSet;

/// A derived column computed by an opaque SQL expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub alias: String,
    pub expression: String,
}

/// Base query plus enrichment columns, ordered by a stable sort key.
///
/// Enrichments keep the order in which they were added, so the composed
/// text (and with it the cache fingerprint) is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentQuery {
    base_query: String,
    sort_key: String,
    enrichments: Vec<Enrichment>,
}

impl EnrichmentQuery {
    pub fn new(base_query: impl Into<String>, sort_key: impl Into<String>) -> Self {
        EnrichmentQuery {
            base_query: base_query.into(),
            sort_key: sort_key.into(),
            enrichments: Vec::new(),
        }
    }

    pub fn with(mut self, alias: impl Into<String>, expression: impl Into<String>) -> Self {
        self.enrichments.push(Enrichment {
            alias: alias.into(),
            expression: expression.into(),
        });
        self
    }

    pub fn base_query(&self) -> &str {
        &self.base_query
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    pub fn enrichments(&self) -> &[Enrichment] {
        &self.enrichments
    }

    /// Builds the composed template. The base query and expressions are
    /// embedded verbatim, with their braces escaped.
    pub fn compose(&self, dialect: &dyn Dialect) -> Result<QueryTemplate, EnrichmentError> {
        let base = self.base_query.trim().trim_end_matches(';').trim();
        if base.is_empty() {
            return Err(EnrichmentError::EmptyBaseQuery);
        }
        validate_identifier(&self.sort_key)?;

        let mut seen = HashSet::new();
        let mut select = vec!["*".to_string()];
        for enrichment in &self.enrichments {
            validate_identifier(&enrichment.alias)?;
            if enrichment.alias.contains('.') {
                return Err(EnrichmentError::InvalidIdentifier(enrichment.alias.clone()));
            }
            if !seen.insert(enrichment.alias.to_lowercase()) {
                return Err(EnrichmentError::DuplicateAlias(enrichment.alias.clone()));
            }
            let expression = enrichment.expression.trim();
            if expression.is_empty() {
                return Err(EnrichmentError::EmptyExpression(enrichment.alias.clone()));
            }

            select.push(format!(
                "{} AS {}",
                escape_braces(expression),
                dialect.quote_identifier(&enrichment.alias)
            ));
        }

        let source = format!(
            "WITH base_data AS ({}) SELECT {} FROM base_data ORDER BY {} LIMIT {{limit}} OFFSET {{offset}}",
            escape_braces(base),
            select.join(", "),
            dialect.quote_path(&self.sort_key),
        );

        Ok(QueryTemplate::parse(&source)?)
    }

    /// Composes and embeds `page_size` as the session's literal limit.
    pub fn bind(
        &self,
        dialect: &dyn Dialect,
        page_size: usize,
    ) -> Result<BoundQuery, EnrichmentError> {
        Ok(self.compose(dialect)?.bind_limit(page_size))
    }
}

/// Accepts plain or dotted identifiers: `id`, `c.customer_id`.
fn validate_identifier(ident: &str) -> Result<(), EnrichmentError> {
    let valid = !ident.is_empty()
        && ident.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        });

    if valid {
        Ok(())
    } else {
        Err(EnrichmentError::InvalidIdentifier(ident.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialect::{Generic, Postgres};

    #[test]
    fn composes_enrichment_columns_in_insertion_order() {
        let query = EnrichmentQuery::new("SELECT * FROM reviews;", "customer_id")
            .with("sentiment", "SNOWFLAKE.CORTEX.SENTIMENT(review_text)")
            .with("summary", "SNOWFLAKE.CORTEX.SUMMARIZE(review_text)");

        let bound = query.bind(&Generic, 250).unwrap();

        assert_eq!(
            bound.render(500),
            "WITH base_data AS (SELECT * FROM reviews) \
             SELECT *, SNOWFLAKE.CORTEX.SENTIMENT(review_text) AS sentiment, \
             SNOWFLAKE.CORTEX.SUMMARIZE(review_text) AS summary \
             FROM base_data ORDER BY customer_id LIMIT 250 OFFSET 500"
        );
    }

    #[test]
    fn quotes_aliases_and_sort_key_through_dialect() {
        let query = EnrichmentQuery::new("SELECT * FROM reviews", "id").with("score", "length(body)");

        let bound = query.bind(&Postgres, 10).unwrap();

        assert!(bound.render(0).contains(r#"length(body) AS "score""#));
        assert!(bound.render(0).contains(r#"ORDER BY "id" LIMIT 10 OFFSET 0"#));
    }

    #[test]
    fn braces_in_expressions_are_literal() {
        let query = EnrichmentQuery::new("SELECT * FROM t", "id")
            .with("label", "PARSE_JSON('{\"k\": 1}'):k");

        let bound = query.bind(&Generic, 5).unwrap();

        assert!(bound.render(0).contains("PARSE_JSON('{\"k\": 1}'):k AS label"));
    }

    #[test]
    fn rejects_bad_aliases() {
        let dup = EnrichmentQuery::new("SELECT 1", "id")
            .with("a", "1")
            .with("A", "2");
        assert_eq!(
            dup.compose(&Generic),
            Err(EnrichmentError::DuplicateAlias("A".into()))
        );

        let invalid = EnrichmentQuery::new("SELECT 1", "id").with("bad alias", "1");
        assert_eq!(
            invalid.compose(&Generic),
            Err(EnrichmentError::InvalidIdentifier("bad alias".into()))
        );

        let empty = EnrichmentQuery::new("  ", "id");
        assert_eq!(empty.compose(&Generic), Err(EnrichmentError::EmptyBaseQuery));
    }

    #[test]
    fn no_enrichments_still_paginates_base() {
        let bound = EnrichmentQuery::new("SELECT * FROM t", "id")
            .bind(&Generic, 100)
            .unwrap();

        assert_eq!(
            bound.render(0),
            "WITH base_data AS (SELECT * FROM t) SELECT * FROM base_data ORDER BY id LIMIT 100 OFFSET 0"
        );
    }
}
