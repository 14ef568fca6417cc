//! Defines the `Dialect` trait for database-specific SQL syntax.

use serde::{Deserialize, Serialize};

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a column name or alias) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    /// - The generic dialect leaves identifiers bare, which keeps the
    ///   warehouse's own case folding in charge.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quotes every part of a dotted path (`table.column`).
    fn quote_path(&self, path: &str) -> String {
        path.split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', r#""""#))
    }
}

#[derive(Debug, Clone)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

#[derive(Debug, Clone)]
pub struct Generic;

impl Dialect for Generic {
    fn quote_identifier(&self, ident: &str) -> String {
        ident.to_string()
    }
}

/// Serializable selector for a [`Dialect`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    MySql,
    #[default]
    Generic,
}

impl DialectKind {
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Postgres => Box::new(Postgres),
            DialectKind::MySql => Box::new(MySql),
            DialectKind::Generic => Box::new(Generic),
        }
    }
}
