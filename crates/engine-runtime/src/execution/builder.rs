use crate::{
    cursor::PageCursor,
    execution::parallel::OffsetRange,
    layers::{cached::CachedPages, monitored::MonitoredPages},
    source::{PagePosition, PageSource},
};
use async_trait::async_trait;
use engine_core::{
    context::SessionContext,
    error::PageError,
    metrics::{MetricsSummary, PaginationMetrics},
};
use model::pagination::page::Page;
use planner::query::{
    dialect::Dialect,
    enrich::EnrichmentQuery,
    template::{BoundQuery, QueryTemplate},
};
use tracing::{Instrument, Span, debug};

/// Assembles the decorator stack for one session.
///
/// Layers, innermost first: the cursor (with retry around each fetch), the
/// page cache, then metrics. Each layer is included only when the context
/// provides it and it was not switched off here.
pub struct PaginatorBuilder {
    ctx: SessionContext,
    cache: bool,
    retry: bool,
    metrics: bool,
}

impl PaginatorBuilder {
    pub fn new(ctx: SessionContext) -> Self {
        let metrics = ctx.options().metrics;
        PaginatorBuilder {
            ctx,
            cache: true,
            retry: true,
            metrics,
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    pub fn build(self, template: &QueryTemplate) -> Paginator {
        let query = template.bind_limit(self.ctx.options().page_size.get());
        self.assemble(query, None)
    }

    /// Composes the enrichment query once, then paginates it like any
    /// other template.
    pub fn build_enriched(
        self,
        query: &EnrichmentQuery,
        dialect: &dyn Dialect,
    ) -> Result<Paginator, PageError> {
        let bound = query.bind(dialect, self.ctx.options().page_size.get())?;
        Ok(self.assemble(bound, None))
    }

    /// A session confined to `range` of the offset space.
    pub fn build_range(self, template: &QueryTemplate, range: OffsetRange) -> Paginator {
        let query = template.bind_limit(self.ctx.options().page_size.get());
        self.assemble(query, Some(range))
    }

    fn assemble(self, query: BoundQuery, range: Option<OffsetRange>) -> Paginator {
        let options = self.ctx.options();
        let page_size = options.page_size;

        let mut cursor = match range {
            Some(range) => {
                PageCursor::new(self.ctx.connector(), query, page_size, Some(range.pages(page_size)))
                    .starting_at(range.start)
            }
            None => PageCursor::new(self.ctx.connector(), query, page_size, options.max_pages),
        };
        if self.retry
            && let Some(policy) = &options.retry
        {
            cursor = cursor.with_retry(policy.clone());
        }

        let metrics = self.metrics.then(PaginationMetrics::new);
        let mut source: Box<dyn PageSource> = Box::new(cursor);

        if self.cache
            && let Some(cache) = self.ctx.cache()
        {
            let mut cached = CachedPages::new(source, cache.clone());
            if let Some(metrics) = &metrics {
                cached = cached.with_metrics(metrics.clone());
            }
            source = Box::new(cached);
        }

        if let Some(metrics) = &metrics {
            source = Box::new(MonitoredPages::new(source, metrics.clone()));
        }

        debug!(
            parent: self.ctx.span(),
            fingerprint = source.fingerprint(),
            cache = self.cache && self.ctx.cache().is_some(),
            metrics = metrics.is_some(),
            "Paginator ready"
        );

        Paginator {
            source,
            metrics,
            span: self.ctx.span().clone(),
        }
    }
}

/// A fully composed page source for one session.
pub struct Paginator {
    source: Box<dyn PageSource>,
    metrics: Option<PaginationMetrics>,
    span: Span,
}

impl Paginator {
    pub fn metrics(&self) -> Option<&PaginationMetrics> {
        self.metrics.as_ref()
    }

    pub fn summary(&self) -> Option<MetricsSummary> {
        self.metrics.as_ref().map(PaginationMetrics::summary)
    }
}

#[async_trait]
impl PageSource for Paginator {
    async fn next_page(&mut self) -> Result<Option<Page>, PageError> {
        self.source.next_page().instrument(self.span.clone()).await
    }

    fn position(&self) -> Option<PagePosition> {
        self.source.position()
    }

    fn skip_page(&mut self, page: &Page) {
        self.source.skip_page(page);
    }

    async fn release(&mut self) {
        self.source.release().await;
    }

    fn fingerprint(&self) -> &str {
        self.source.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{FakeConnector, FakeTable, connection_reset, page_of};
    use engine_core::{
        cache::{PageCache, fingerprint, memory::MemoryCacheBackend},
        context::SessionOptions,
        retry::RetryPolicy,
    };
    use planner::query::dialect::Generic;
    use std::{num::NonZeroUsize, sync::Arc, time::Duration};

    fn ctx(table: &Arc<FakeTable>, page_size: usize) -> SessionContext {
        SessionContext::new(
            Arc::new(FakeConnector(table.clone())),
            SessionOptions {
                page_size: NonZeroUsize::new(page_size).unwrap(),
                max_pages: None,
                retry: Some(RetryPolicy::new(3, 2.0).with_backoff_unit(Duration::from_millis(5))),
                metrics: true,
            },
        )
    }

    fn template() -> QueryTemplate {
        QueryTemplate::parse("SELECT id FROM t LIMIT {limit} OFFSET {offset}").unwrap()
    }

    async fn drain(paginator: &mut Paginator) -> Vec<usize> {
        let mut counts = Vec::new();
        while let Some(page) = paginator.next_page().await.unwrap() {
            counts.push(page.record_count());
        }
        counts
    }

    #[tokio::test(start_paused = true)]
    async fn full_stack_recovers_and_counts() {
        let table = FakeTable::new(120);
        table.fail_next(connection_reset());
        let cache = PageCache::new(Arc::new(MemoryCacheBackend::new()));
        let ctx = ctx(&table, 50).with_cache(cache);

        let mut paginator = PaginatorBuilder::new(ctx.clone()).build(&template());
        assert_eq!(drain(&mut paginator).await, vec![50, 50, 20]);

        let summary = paginator.summary().unwrap();
        assert_eq!(summary.total_pages_processed, 3);
        assert_eq!(summary.total_records_processed, 120);
        assert_eq!(summary.cache_misses, 4);
        assert_eq!(summary.error_count, 0);

        let executed = table.executed().len();
        let mut again = PaginatorBuilder::new(ctx).build(&template());
        assert_eq!(drain(&mut again).await, vec![50, 50, 20]);
        assert_eq!(again.summary().unwrap().cache_hits, 3);
        // only the terminating fetch goes to the database
        assert_eq!(table.executed().len(), executed + 1);
    }

    #[tokio::test]
    async fn cache_hit_at_the_ceiling_releases_the_handle() {
        let table = FakeTable::new(1000);
        let cache = PageCache::new(Arc::new(MemoryCacheBackend::new()));
        let key = fingerprint(&template().bind_limit(100).text());
        cache.put(&key, 2, &page_of(2, 100, 100)).await.unwrap();

        let ctx = SessionContext::new(
            Arc::new(FakeConnector(table.clone())),
            SessionOptions {
                page_size: NonZeroUsize::new(100).unwrap(),
                max_pages: Some(2),
                retry: None,
                metrics: true,
            },
        )
        .with_cache(cache);
        let mut paginator = PaginatorBuilder::new(ctx).build(&template());

        assert_eq!(paginator.next_page().await.unwrap().unwrap().offset(), 0);
        assert_eq!(table.closes(), 0);

        let second = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(second.page_number(), 2);
        assert_eq!(table.connects(), 1);
        assert_eq!(table.closes(), 1);
        assert_eq!(table.executed().len(), 1);

        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(table.connects(), 1);
    }

    #[tokio::test]
    async fn layers_can_be_switched_off() {
        let table = FakeTable::new(10);
        table.fail_next(connection_reset());
        let mut paginator = PaginatorBuilder::new(ctx(&table, 5))
            .without_retry()
            .with_metrics(false)
            .build(&template());

        assert!(paginator.next_page().await.is_err());
        assert!(paginator.summary().is_none());
    }

    #[tokio::test]
    async fn enriched_query_is_composed_once() {
        let table = FakeTable::new(7);
        let query = EnrichmentQuery::new("SELECT * FROM reviews", "id").with("score", "length(body)");
        let mut paginator = PaginatorBuilder::new(ctx(&table, 5))
            .build_enriched(&query, &Generic)
            .unwrap();

        assert_eq!(drain(&mut paginator).await, vec![5, 2]);
        assert!(
            table
                .executed()
                .iter()
                .all(|sql| sql.starts_with("WITH base_data AS (SELECT * FROM reviews)"))
        );
    }

    #[tokio::test]
    async fn invalid_enrichment_is_rejected_before_any_fetch() {
        let table = FakeTable::new(7);
        let query = EnrichmentQuery::new("SELECT * FROM reviews", "id").with("bad alias", "1");

        let result = PaginatorBuilder::new(ctx(&table, 5)).build_enriched(&query, &Generic);

        assert!(matches!(result, Err(PageError::Enrichment(_))));
        assert_eq!(table.connects(), 0);
    }
}
