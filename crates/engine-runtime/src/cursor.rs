use crate::{
    retry::page_fetch_disposition,
    source::{PagePosition, PageSource},
};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::{Connector, QueryHandle},
    error::DbError,
};
use engine_core::{cache::fingerprint, error::PageError, retry::RetryPolicy};
use model::{
    pagination::{page::Page, session::PaginationSession},
    records::row::Record,
};
use planner::query::template::{BoundQuery, QueryTemplate};
use std::{num::NonZeroUsize, sync::Arc};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, info, warn};

type HandleSlot = Mutex<Option<Box<dyn QueryHandle>>>;

/// Executes one bounded query per page against a moving offset window.
///
/// The query handle is opened on the first fetch and held until the
/// sequence ends, the ceiling is reached, or a fetch fails; it is closed on
/// each of those paths. Dropping the cursor mid-session drops the handle.
pub struct PageCursor {
    connector: Arc<dyn Connector>,
    handle: HandleSlot,
    query: BoundQuery,
    fingerprint: String,
    session: PaginationSession,
    retry: Option<RetryPolicy>,
}

impl PageCursor {
    pub fn new(
        connector: Arc<dyn Connector>,
        query: BoundQuery,
        page_size: NonZeroUsize,
        max_pages: Option<usize>,
    ) -> Self {
        PageCursor {
            connector,
            handle: Mutex::new(None),
            fingerprint: fingerprint(&query.text()),
            query,
            session: PaginationSession::new(page_size, max_pages),
            retry: None,
        }
    }

    /// Binds `page_size` into the template once for the whole session.
    pub fn from_template(
        connector: Arc<dyn Connector>,
        template: &QueryTemplate,
        page_size: NonZeroUsize,
        max_pages: Option<usize>,
    ) -> Self {
        Self::new(
            connector,
            template.bind_limit(page_size.get()),
            page_size,
            max_pages,
        )
    }

    /// Gives every page fetch its own retry budget.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Starts the offset window at `offset`. Sessions over different start
    /// offsets never share cache entries.
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.session = self.session.clone().starting_at(offset);
        self.fingerprint = if offset == 0 {
            fingerprint(&self.query.text())
        } else {
            fingerprint(&format!("{}@{}", self.query.text(), offset))
        };
        self
    }

    pub fn session(&self) -> &PaginationSession {
        &self.session
    }

    pub fn query(&self) -> &BoundQuery {
        &self.query
    }

    /// Rewinds to the first window. Any open handle is closed first.
    pub async fn restart(&mut self) {
        self.close_handle().await;
        self.session.reset();
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Record>, PageError> {
        let connector = &self.connector;
        let slot = &self.handle;
        let attempt = move || fetch_once(connector, slot, sql);

        match &self.retry {
            Some(policy) => policy.run_classified(attempt, page_fetch_disposition).await,
            None => attempt().await,
        }
    }

    async fn close_handle(&mut self) {
        if let Some(mut handle) = self.handle.get_mut().take() {
            match handle.close().await {
                Ok(()) => debug!("Released query handle"),
                Err(err) => warn!(error = %err, "Failed to close query handle"),
            }
        }
    }
}

async fn fetch_once(
    connector: &Arc<dyn Connector>,
    slot: &HandleSlot,
    sql: &str,
) -> Result<Vec<Record>, PageError> {
    let mut guard = slot.lock().await;
    if guard.as_ref().is_none_or(|handle| handle.is_closed()) {
        *guard = Some(connector.connect().await?);
        debug!("Opened query handle");
    }

    let Some(handle) = guard.as_mut() else {
        return Err(DbError::Closed.into());
    };

    let result = match handle.execute(sql).await {
        Ok(()) => handle.fetch_all().await,
        Err(err) => Err(err),
    };

    match result {
        Ok(records) => Ok(records),
        Err(err) => {
            // A lost session is reopened on the next attempt.
            if err.is_connection_loss()
                && let Some(mut lost) = guard.take()
            {
                let _ = lost.close().await;
            }
            Err(err.into())
        }
    }
}

#[async_trait]
impl PageSource for PageCursor {
    async fn next_page(&mut self) -> Result<Option<Page>, PageError> {
        let Some(window) = self.session.next_window() else {
            self.close_handle().await;
            return Ok(None);
        };

        let sql = self.query.render(window.offset);
        debug!(offset = window.offset, limit = window.limit, %sql, "Fetching page");

        let started = Instant::now();
        let records = match self.fetch(&sql).await {
            Ok(records) => records,
            Err(err) => {
                error!(offset = window.offset, error = %err, "Page fetch failed");
                self.session.finish();
                self.close_handle().await;
                return Err(err);
            }
        };
        let execution_time = started.elapsed();

        let Some(page_number) = self.session.record(records.len()) else {
            info!(offset = window.offset, "Empty page, pagination complete");
            self.close_handle().await;
            return Ok(None);
        };

        let page = Page::new(page_number, window.offset, records, execution_time);
        info!(
            page = page_number,
            offset = window.offset,
            records = page.record_count(),
            elapsed_ms = execution_time.as_millis() as u64,
            "Fetched page"
        );

        if self.session.ceiling_reached() {
            info!(max_pages = ?self.session.max_pages(), "Page ceiling reached");
            self.close_handle().await;
        }

        Ok(Some(page))
    }

    fn position(&self) -> Option<PagePosition> {
        self.session.next_window().map(|window| PagePosition {
            page_number: self.session.next_page_number(),
            offset: window.offset,
        })
    }

    fn skip_page(&mut self, page: &Page) {
        self.session.skip(page);
    }

    async fn release(&mut self) {
        self.close_handle().await;
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
