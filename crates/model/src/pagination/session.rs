use crate::pagination::page::Page;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// The row range `[offset, offset + limit)` requested by a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetWindow {
    pub offset: usize,
    pub limit: usize,
}

/// State of one pagination run.
///
/// The offset only ever moves forward by `page_size`, so a session never
/// revisits a window. It finishes when a fetch comes back empty or when
/// `max_pages` pages have been produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationSession {
    page_size: NonZeroUsize,
    max_pages: Option<usize>,
    start_offset: usize,
    offset: usize,
    pages_produced: usize,
    finished: bool,
}

impl PaginationSession {
    pub fn new(page_size: NonZeroUsize, max_pages: Option<usize>) -> Self {
        PaginationSession {
            page_size,
            max_pages,
            start_offset: 0,
            offset: 0,
            pages_produced: 0,
            finished: false,
        }
    }

    /// Starts the session at `offset` instead of zero. Used by partitioned
    /// runs where each worker owns a disjoint slice of the offset space.
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.start_offset = offset;
        self.offset = offset;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn pages_produced(&self) -> usize {
        self.pages_produced
    }

    /// Page number the next produced page will carry (1-based).
    pub fn next_page_number(&self) -> usize {
        self.pages_produced + 1
    }

    pub fn ceiling_reached(&self) -> bool {
        matches!(self.max_pages, Some(max) if self.pages_produced >= max)
    }

    pub fn is_finished(&self) -> bool {
        self.finished || self.ceiling_reached()
    }

    /// Window for the next fetch, or `None` once the session is over.
    pub fn next_window(&self) -> Option<OffsetWindow> {
        if self.is_finished() {
            return None;
        }

        Some(OffsetWindow {
            offset: self.offset,
            limit: self.page_size.get(),
        })
    }

    /// Records the outcome of a fetch. An empty fetch ends the session;
    /// otherwise the offset advances and the new page number is returned.
    pub fn record(&mut self, row_count: usize) -> Option<usize> {
        if row_count == 0 {
            self.finished = true;
            return None;
        }

        self.pages_produced += 1;
        self.offset += self.page_size.get();
        Some(self.pages_produced)
    }

    /// Advances past a page that was served without a fetch.
    pub fn skip(&mut self, page: &Page) {
        self.record(page.record_count());
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Rewinds to the starting offset for a fresh run.
    pub fn reset(&mut self) {
        self.offset = self.start_offset;
        self.pages_produced = 0;
        self.finished = false;
    }
}
