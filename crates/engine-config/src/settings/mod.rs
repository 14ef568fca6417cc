//! Pager settings as read from a JSON file.
//!
//! String values may reference environment variables as `${VAR}`; they are
//! resolved before the document is deserialized.

use crate::settings::{
    error::SettingsError,
    validated::{CachePlan, CacheStore, ParallelPlan, QueryPlan, ValidatedSettings},
};
use connectors::adapter::Driver;
use engine_core::{
    cache::DEFAULT_KEY_PREFIX,
    context::SessionOptions,
    retry::RetryPolicy,
};
use planner::query::{dialect::DialectKind, enrich::EnrichmentQuery, template::QueryTemplate};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, path::Path, path::PathBuf, time::Duration};
use tracing::debug;

pub mod env;
pub mod error;
pub mod validated;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PagerSettings {
    pub connection: ConnectionSettings,
    pub query: QuerySettings,
    #[serde(default)]
    pub pagination: PaginationSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub cache: Option<CacheSettings>,
    #[serde(default)]
    pub parallel: Option<ParallelSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSettings {
    pub driver: Driver,
    pub url: String,
    /// Identifier quoting for composed queries. Defaults to the driver's.
    #[serde(default)]
    pub dialect: Option<DialectKind>,
}

/// Either a ready template, or a base query plus enrichment columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySettings {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub base_query: Option<String>,
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(default)]
    pub enrichments: Vec<EnrichmentSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentSettings {
    pub alias: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationSettings {
    pub page_size: usize,
    pub max_pages: Option<usize>,
    pub metrics: bool,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        PaginationSettings {
            page_size: 1000,
            max_pages: None,
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_retries: usize,
    pub backoff_factor: f64,
    pub backoff_unit_ms: u64,
    pub max_delay_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            enabled: true,
            max_retries: 3,
            backoff_factor: 2.0,
            backoff_unit_ms: 1000,
            max_delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Directory of a local sled cache database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Redis server shared by every pager process (`redis://host:port/db`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelSettings {
    pub workers: usize,
    /// Row count to partition. Counted with a query when absent.
    #[serde(default)]
    pub total_rows: Option<usize>,
}

impl PagerSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading settings");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses a settings document, resolving `${VAR}` from the environment.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        env::interpolate_env(&mut value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn dialect(&self) -> DialectKind {
        self.connection
            .dialect
            .unwrap_or(match self.connection.driver {
                Driver::Postgres => DialectKind::Postgres,
                Driver::MySql => DialectKind::MySql,
            })
    }

    pub fn validate(&self) -> Result<ValidatedSettings, SettingsError> {
        let page_size =
            NonZeroUsize::new(self.pagination.page_size).ok_or(SettingsError::InvalidValue {
                field: "pagination.page_size",
                reason: "must be greater than zero".into(),
            })?;

        if self.connection.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue {
                field: "connection.url",
                reason: "must not be empty".into(),
            });
        }

        let plan = self.query_plan()?;
        let retry = self.retry.policy()?;

        let cache = self.cache.as_ref().map(CacheSettings::plan).transpose()?;

        let parallel = match &self.parallel {
            Some(parallel) => {
                let workers =
                    NonZeroUsize::new(parallel.workers).ok_or(SettingsError::InvalidValue {
                        field: "parallel.workers",
                        reason: "must be greater than zero".into(),
                    })?;
                if parallel.total_rows.is_none() && plan.count_sql().is_none() {
                    return Err(SettingsError::InvalidValue {
                        field: "parallel.total_rows",
                        reason: "required when the query is given as a template".into(),
                    });
                }
                Some(ParallelPlan {
                    workers,
                    total_rows: parallel.total_rows,
                })
            }
            None => None,
        };

        Ok(ValidatedSettings {
            driver: self.connection.driver,
            url: self.connection.url.clone(),
            plan,
            options: SessionOptions {
                page_size,
                max_pages: self.pagination.max_pages,
                retry,
                metrics: self.pagination.metrics,
            },
            cache,
            parallel,
        })
    }

    fn query_plan(&self) -> Result<QueryPlan, SettingsError> {
        let query = &self.query;
        match (&query.template, &query.base_query) {
            (Some(template), None) => {
                if query.sort_key.is_some() || !query.enrichments.is_empty() {
                    return Err(SettingsError::InvalidQuery(
                        "`sort_key` and `enrichments` require `base_query`".into(),
                    ));
                }
                Ok(QueryPlan::Template(QueryTemplate::parse(template)?))
            }
            (None, Some(base)) => {
                let sort_key = query.sort_key.as_ref().ok_or_else(|| {
                    SettingsError::InvalidQuery("`base_query` requires a `sort_key`".into())
                })?;
                let enriched = query
                    .enrichments
                    .iter()
                    .fold(EnrichmentQuery::new(base, sort_key), |q, e| {
                        q.with(&e.alias, &e.expression)
                    });
                let dialect = self.dialect();
                // Surface composition errors at load time.
                enriched.compose(dialect.dialect().as_ref())?;

                Ok(QueryPlan::Enriched {
                    query: enriched,
                    dialect,
                })
            }
            (Some(_), Some(_)) => Err(SettingsError::InvalidQuery(
                "set either `template` or `base_query`, not both".into(),
            )),
            (None, None) => Err(SettingsError::InvalidQuery(
                "one of `template` or `base_query` is required".into(),
            )),
        }
    }
}

impl CacheSettings {
    fn plan(&self) -> Result<CachePlan, SettingsError> {
        let store = match (&self.path, &self.url) {
            (Some(path), None) => CacheStore::Sled(path.clone()),
            (None, Some(url)) if !url.trim().is_empty() => CacheStore::Redis(url.clone()),
            (None, Some(_)) => {
                return Err(SettingsError::InvalidValue {
                    field: "cache.url",
                    reason: "must not be empty".into(),
                });
            }
            (Some(_), Some(_)) | (None, None) => {
                return Err(SettingsError::InvalidValue {
                    field: "cache",
                    reason: "set exactly one of `path` or `url`".into(),
                });
            }
        };

        Ok(CachePlan {
            store,
            ttl: Duration::from_secs(self.ttl_secs),
            key_prefix: self.key_prefix.clone(),
        })
    }
}

impl RetrySettings {
    /// `None` when retries are disabled.
    pub fn policy(&self) -> Result<Option<RetryPolicy>, SettingsError> {
        if !self.enabled {
            return Ok(None);
        }
        if self.max_retries == 0 {
            return Err(SettingsError::InvalidValue {
                field: "retry.max_retries",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor > 0.0) {
            return Err(SettingsError::InvalidValue {
                field: "retry.backoff_factor",
                reason: format!("must be positive, got {}", self.backoff_factor),
            });
        }

        let mut policy = RetryPolicy::new(self.max_retries, self.backoff_factor)
            .with_backoff_unit(Duration::from_millis(self.backoff_unit_ms));
        if let Some(max_delay_ms) = self.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(max_delay_ms));
        }
        Ok(Some(policy))
    }
}
