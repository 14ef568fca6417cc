use crate::records::row::Record;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One bounded batch of rows produced by a single query execution.
///
/// Pages are immutable once built: `record_count` is derived from the
/// records at construction and the fields are only reachable through
/// accessors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    page_number: usize,
    record_count: usize,
    records: Vec<Record>,
    execution_time: Duration,
    offset: usize,
}

impl Page {
    pub fn new(
        page_number: usize,
        offset: usize,
        records: Vec<Record>,
        execution_time: Duration,
    ) -> Self {
        Page {
            page_number,
            record_count: records.len(),
            records,
            execution_time,
            offset,
        }
    }

    /// 1-based position of the page within its session.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// Row offset of the window that produced this page.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
