use async_trait::async_trait;
use engine_core::error::PageError;
use futures::Stream;
use model::pagination::page::Page;

/// Where the next page of a source would come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    pub page_number: usize,
    pub offset: usize,
}

/// Anything that yields pages one at a time.
///
/// The cursor implements it directly; retry-free decorators (cache,
/// metrics) wrap another source and implement it again, so any subset of
/// them composes by plain wrapping.
#[async_trait]
pub trait PageSource: Send {
    /// Next page, or `None` once the sequence is over. After an error the
    /// sequence is over as well.
    async fn next_page(&mut self) -> Result<Option<Page>, PageError>;

    /// Position of the next fetch, `None` when no further fetch will be issued.
    fn position(&self) -> Option<PagePosition>;

    /// Advances past `page` without fetching it. Used when the page was
    /// served from elsewhere.
    fn skip_page(&mut self, page: &Page);

    /// Frees whatever the source holds open. Called once no further fetch
    /// will be issued through it.
    async fn release(&mut self) {}

    /// Stable identity of the session's query text.
    fn fingerprint(&self) -> &str;
}

#[async_trait]
impl<S: PageSource + ?Sized> PageSource for Box<S> {
    async fn next_page(&mut self) -> Result<Option<Page>, PageError> {
        (**self).next_page().await
    }

    fn position(&self) -> Option<PagePosition> {
        (**self).position()
    }

    fn skip_page(&mut self, page: &Page) {
        (**self).skip_page(page)
    }

    async fn release(&mut self) {
        (**self).release().await
    }

    fn fingerprint(&self) -> &str {
        (**self).fingerprint()
    }
}

/// Exposes a source as a stream that ends after the first error.
pub fn into_stream<S: PageSource>(source: S) -> impl Stream<Item = Result<Page, PageError>> + Send {
    futures::stream::try_unfold(source, |mut source| async move {
        Ok(source.next_page().await?.map(|page| (page, source)))
    })
}
