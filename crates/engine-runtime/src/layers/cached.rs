use crate::source::{PagePosition, PageSource};
use async_trait::async_trait;
use engine_core::{cache::PageCache, error::PageError, metrics::PaginationMetrics};
use model::pagination::page::Page;
use tracing::{debug, warn};

/// Serves pages from a [`PageCache`] before falling back to `inner`.
///
/// A hit advances the inner source past the page without a fetch, so the
/// inner ceiling still applies. The cache never ends a session: read
/// failures count as misses and write failures are only logged (and
/// recorded in the session metrics when present).
pub struct CachedPages<S> {
    inner: S,
    cache: PageCache,
    metrics: Option<PaginationMetrics>,
}

impl<S: PageSource> CachedPages<S> {
    pub fn new(inner: S, cache: PageCache) -> Self {
        CachedPages {
            inner,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PaginationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn record_error(&self, error: String) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(error);
        }
    }

    async fn lookup(&mut self, fingerprint: &str, position: PagePosition) -> Option<Page> {
        match self.cache.get(fingerprint, position.page_number).await {
            Ok(Some(page)) if page.offset() == position.offset && !page.is_empty() => Some(page),
            Ok(Some(page)) => {
                debug!(
                    page = position.page_number,
                    cached_offset = page.offset(),
                    "Ignoring cached page for a different window"
                );
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(page = position.page_number, error = %err, "Cache read failed, treating as miss");
                self.record_error(format!("cache read failed: {err}"));
                None
            }
        }
    }
}

#[async_trait]
impl<S: PageSource> PageSource for CachedPages<S> {
    async fn next_page(&mut self) -> Result<Option<Page>, PageError> {
        let Some(position) = self.inner.position() else {
            return self.inner.next_page().await;
        };
        let fingerprint = self.inner.fingerprint().to_string();

        if let Some(page) = self.lookup(&fingerprint, position).await {
            debug!(page = position.page_number, "Serving page from cache");
            self.inner.skip_page(&page);
            if self.inner.position().is_none() {
                self.inner.release().await;
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_hit();
            }
            return Ok(Some(page));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        let page = self.inner.next_page().await?;
        if let Some(page) = &page
            && let Err(err) = self.cache.put(&fingerprint, page.page_number(), page).await
        {
            warn!(page = page.page_number(), error = %err, "Cache write failed");
            self.record_error(format!("cache write failed: {err}"));
        }

        Ok(page)
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
