use engine_core::context::SessionOptions;
use connectors::adapter::Driver;
use planner::query::{
    dialect::DialectKind,
    enrich::EnrichmentQuery,
    error::EnrichmentError,
    template::{QueryTemplate, count_query},
};
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

/// What a session paginates.
#[derive(Debug, Clone)]
pub enum QueryPlan {
    Template(QueryTemplate),
    Enriched {
        query: EnrichmentQuery,
        dialect: DialectKind,
    },
}

impl QueryPlan {
    /// The paginated template; enrichment plans are composed here.
    pub fn template(&self) -> Result<QueryTemplate, EnrichmentError> {
        match self {
            QueryPlan::Template(template) => Ok(template.clone()),
            QueryPlan::Enriched { query, dialect } => query.compose(dialect.dialect().as_ref()),
        }
    }

    /// Row count query for sizing a partitioned run. Only a plain base
    /// query can be counted.
    pub fn count_sql(&self) -> Option<String> {
        match self {
            QueryPlan::Template(_) => None,
            QueryPlan::Enriched { query, .. } => Some(count_query(query.base_query())),
        }
    }
}

/// Where cached pages live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStore {
    /// Local sled database; one process at a time.
    Sled(PathBuf),
    /// Redis server URL, shared across processes.
    Redis(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachePlan {
    pub store: CacheStore,
    pub ttl: Duration,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelPlan {
    pub workers: NonZeroUsize,
    pub total_rows: Option<usize>,
}

/// Immutable, validated configuration for one pager run.
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    pub driver: Driver,
    pub url: String,
    pub plan: QueryPlan,
    pub options: SessionOptions,
    pub cache: Option<CachePlan>,
    pub parallel: Option<ParallelPlan>,
}
