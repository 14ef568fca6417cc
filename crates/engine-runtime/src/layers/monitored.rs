use crate::source::{PagePosition, PageSource};
use async_trait::async_trait;
use engine_core::{
    error::PageError,
    metrics::{MetricsSummary, PaginationMetrics},
};
use model::pagination::page::Page;

/// Observes a page sequence without altering it.
///
/// Failures are recorded and then returned unchanged.
pub struct MonitoredPages<S> {
    inner: S,
    metrics: PaginationMetrics,
}

impl<S: PageSource> MonitoredPages<S> {
    pub fn new(inner: S, metrics: PaginationMetrics) -> Self {
        MonitoredPages { inner, metrics }
    }

    pub fn metrics(&self) -> &PaginationMetrics {
        &self.metrics
    }

    pub fn summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: PageSource> PageSource for MonitoredPages<S> {
    async fn next_page(&mut self) -> Result<Option<Page>, PageError> {
        self.metrics.start();

        match self.inner.next_page().await {
            Ok(Some(page)) => {
                self.metrics.record_page(page.record_count());
                if self.inner.position().is_none() {
                    self.metrics.finish();
                }
                Ok(Some(page))
            }
            Ok(None) => {
                self.metrics.finish();
                Ok(None)
            }
            Err(err) => {
                self.metrics.record_error(&err);
                self.metrics.finish();
                Err(err)
            }
        }
    }

    fn position(&self) -> Option<PagePosition> {
        self.inner.position()
    }

    fn skip_page(&mut self, page: &Page) {
        self.inner.skip_page(page);
    }

    async fn release(&mut self) {
        self.inner.release().await;
    }

    fn fingerprint(&self) -> &str {
        self.inner.fingerprint()
    }
}
