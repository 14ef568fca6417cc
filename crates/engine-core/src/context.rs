use crate::{cache::PageCache, retry::RetryPolicy};
use connectors::sql::base::adapter::Connector;
use std::{num::NonZeroUsize, sync::Arc};
use tracing::{Span, info_span};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(size) => size,
    None => unreachable!(),
};

/// Per-session knobs that shape the decorator stack.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub page_size: NonZeroUsize,
    pub max_pages: Option<usize>,
    /// `None` runs every fetch exactly once.
    pub retry: Option<RetryPolicy>,
    pub metrics: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            retry: Some(RetryPolicy::default()),
            metrics: true,
        }
    }
}

/// Everything a pagination session needs, passed explicitly.
///
/// The connector opens one handle per session (or per worker); the span
/// is the logging sink every layer of the session records under.
#[derive(Clone)]
pub struct SessionContext {
    session_id: String,
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    cache: Option<PageCache>,
    span: Span,
}

impl SessionContext {
    pub fn new(connector: Arc<dyn Connector>, options: SessionOptions) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "pagination",
            session = %session_id,
            page_size = options.page_size.get()
        );

        SessionContext {
            session_id,
            connector,
            options,
            cache: None,
            span,
        }
    }

    pub fn with_cache(mut self, cache: PageCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&PageCache> {
        self.cache.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish()
    }
}
