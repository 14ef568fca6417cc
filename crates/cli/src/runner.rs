use crate::{conn::count_rows, error::CliError};
use connectors::adapter::connector;
use engine_config::settings::{
    PagerSettings,
    validated::{CacheStore, ParallelPlan, QueryPlan, ValidatedSettings},
};
use engine_core::{
    cache::{
        CacheBackend, PageCache, fingerprint, redis_store::RedisCacheBackend,
        sled_store::SledCacheBackend,
    },
    context::SessionContext,
    error::PageError,
    metrics::MetricsSummary,
};
use engine_runtime::{
    execution::{
        builder::{Paginator, PaginatorBuilder},
        parallel::{RangeOutcome, RangePage, partition, run_partitioned},
    },
    source::PageSource,
};
use std::{path::Path, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line overrides applied on top of the settings file.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub page_size: Option<usize>,
    pub max_pages: Option<usize>,
}

pub enum RunReport {
    Sequential(Option<MetricsSummary>),
    Partitioned(Vec<RangeOutcome>),
}

pub fn load(config: &Path, overrides: Overrides) -> Result<ValidatedSettings, CliError> {
    let mut settings = PagerSettings::load(config)?;
    if let Some(page_size) = overrides.page_size {
        settings.pagination.page_size = page_size;
    }
    if let Some(max_pages) = overrides.max_pages {
        settings.pagination.max_pages = Some(max_pages);
    }
    Ok(settings.validate()?)
}

/// Session text and fingerprint of the configured query.
pub fn render(settings: &ValidatedSettings) -> Result<(String, String), CliError> {
    let template = settings.plan.template().map_err(PageError::from)?;
    let text = template.bind_limit(settings.options.page_size.get()).text();
    let fingerprint = fingerprint(&text);
    Ok((text, fingerprint))
}

pub async fn run(
    settings: ValidatedSettings,
    cancel: CancellationToken,
) -> Result<RunReport, CliError> {
    let connector = connector(settings.driver, &settings.url);
    let mut ctx = SessionContext::new(connector, settings.options.clone());

    if let Some(cache) = &settings.cache {
        let backend: Arc<dyn CacheBackend> = match &cache.store {
            CacheStore::Sled(path) => Arc::new(SledCacheBackend::open(path)?),
            CacheStore::Redis(url) => Arc::new(RedisCacheBackend::connect(url).await?),
        };
        ctx = ctx.with_cache(
            PageCache::new(backend)
                .with_ttl(cache.ttl)
                .with_key_prefix(cache.key_prefix.clone()),
        );
    }

    info!(
        session = ctx.session_id(),
        driver = %settings.driver,
        page_size = settings.options.page_size.get(),
        "Starting pagination"
    );

    match settings.parallel {
        Some(parallel) => run_partitioned_session(&ctx, &settings, parallel, cancel).await,
        None => run_session(&ctx, &settings, cancel).await,
    }
}

async fn run_session(
    ctx: &SessionContext,
    settings: &ValidatedSettings,
    cancel: CancellationToken,
) -> Result<RunReport, CliError> {
    let builder = PaginatorBuilder::new(ctx.clone());
    let mut paginator = match &settings.plan {
        QueryPlan::Template(template) => builder.build(template),
        QueryPlan::Enriched { query, dialect } => {
            builder.build_enriched(query, dialect.dialect().as_ref())?
        }
    };

    drain(&mut paginator, &cancel).await?;
    Ok(RunReport::Sequential(paginator.summary()))
}

async fn drain(paginator: &mut Paginator, cancel: &CancellationToken) -> Result<(), CliError> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Pagination cancelled");
                return Err(CliError::ShutdownRequested);
            }
            next = paginator.next_page() => next?,
        };

        match next {
            Some(page) => info!(
                page = page.page_number(),
                offset = page.offset(),
                records = page.record_count(),
                "Page received"
            ),
            None => return Ok(()),
        }
    }
}

async fn run_partitioned_session(
    ctx: &SessionContext,
    settings: &ValidatedSettings,
    parallel: ParallelPlan,
    cancel: CancellationToken,
) -> Result<RunReport, CliError> {
    let template = settings.plan.template().map_err(PageError::from)?;

    let total_rows = match (parallel.total_rows, settings.plan.count_sql()) {
        (Some(total), _) => total,
        (None, Some(sql)) => count_rows(&ctx.connector(), &sql).await?,
        (None, None) => {
            return Err(CliError::Unexpected(
                "parallel run needs total_rows or a countable base query".into(),
            ));
        }
    };

    let ranges = partition(total_rows, settings.options.page_size, parallel.workers.get());
    info!(total_rows, ranges = ranges.len(), "Partitioned offset space");

    let (tx, mut rx) = mpsc::channel::<RangePage>(64);
    let consumer = tokio::spawn(async move {
        let mut records = 0usize;
        while let Some(RangePage { range, page }) = rx.recv().await {
            records += page.record_count();
            info!(
                range_start = range.start,
                page = page.page_number(),
                offset = page.offset(),
                records = page.record_count(),
                "Page received"
            );
        }
        records
    });

    let outcomes = tokio::select! {
        _ = cancel.cancelled() => {
            warn!("Pagination cancelled");
            return Err(CliError::ShutdownRequested);
        }
        outcomes = run_partitioned(ctx, &template, ranges, tx) => outcomes,
    };

    let received = consumer
        .await
        .map_err(|err| CliError::Unexpected(err.to_string()))?;
    info!(records = received, "All ranges finished");

    Ok(RunReport::Partitioned(outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn overrides_replace_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "connection": { "driver": "pg", "url": "postgres://localhost/db" },
                "query": { "template": "SELECT * FROM t ORDER BY id LIMIT {limit} OFFSET {offset}" },
                "pagination": { "page_size": 100 }
            }"#,
        )
        .unwrap();

        let settings = load(
            file.path(),
            Overrides {
                page_size: Some(250),
                max_pages: Some(3),
            },
        )
        .unwrap();

        assert_eq!(settings.options.page_size.get(), 250);
        assert_eq!(settings.options.max_pages, Some(3));

        let (text, fingerprint) = render(&settings).unwrap();
        assert_eq!(text, "SELECT * FROM t ORDER BY id LIMIT 250 OFFSET {offset}");
        assert_eq!(fingerprint.len(), 64);
    }
}
