use crate::source::{PagePosition, PageSource};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::{Connector, QueryHandle},
    error::{ConnectorError, DbError},
};
use engine_core::{
    cache::CacheBackend,
    error::{CacheError, PageError},
};
use model::{
    core::value::Value,
    pagination::page::Page,
    records::row::Record,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub fn page_of(page_number: usize, offset: usize, count: usize) -> Page {
    let columns = vec!["id".to_string()];
    let records = (offset..offset + count)
        .map(|id| Record::from_columns(&columns, [Value::Int(id as i64)]))
        .collect();
    Page::new(page_number, offset, records, Duration::from_millis(1))
}

/// Page source replaying a fixed script.
pub struct ScriptedSource {
    script: VecDeque<Result<Page, PageError>>,
    fetches: usize,
    next_page_number: usize,
    next_offset: usize,
    finished: bool,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Page, PageError>>) -> Self {
        ScriptedSource {
            script: script.into(),
            fetches: 0,
            next_page_number: 1,
            next_offset: 0,
            finished: false,
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches
    }

    fn advance(&mut self, page: &Page) {
        self.next_page_number = page.page_number() + 1;
        self.next_offset = page.offset() + page.record_count();
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn next_page(&mut self) -> Result<Option<Page>, PageError> {
        self.fetches += 1;
        match self.script.pop_front() {
            Some(Ok(page)) => {
                self.advance(&page);
                Ok(Some(page))
            }
            Some(Err(err)) => {
                self.finished = true;
                Err(err)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn position(&self) -> Option<PagePosition> {
        (!self.finished).then_some(PagePosition {
            page_number: self.next_page_number,
            offset: self.next_offset,
        })
    }

    fn skip_page(&mut self, page: &Page) {
        self.script.pop_front();
        self.advance(page);
    }

    fn fingerprint(&self) -> &str {
        "scripted"
    }
}

pub struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

/// In-memory table of `rows` sequential ids. Reads `LIMIT n` and
/// `OFFSET n` from the submitted SQL.
#[derive(Default)]
pub struct FakeTable {
    pub rows: usize,
    pub executed: Mutex<Vec<String>>,
    pub failures: Mutex<VecDeque<DbError>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl FakeTable {
    pub fn new(rows: usize) -> Arc<Self> {
        Arc::new(FakeTable {
            rows,
            ..Default::default()
        })
    }

    pub fn fail_next(&self, err: DbError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector(pub Arc<FakeTable>);

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn QueryHandle>, ConnectorError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            table: self.0.clone(),
            columns: vec!["id".to_string()],
            pending: None,
            closed: false,
        }))
    }
}

struct FakeHandle {
    table: Arc<FakeTable>,
    columns: Vec<String>,
    pending: Option<Vec<Record>>,
    closed: bool,
}

fn number_after(sql: &str, keyword: &str) -> Option<usize> {
    let start = sql.find(keyword)? + keyword.len();
    sql[start..]
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}

#[async_trait]
impl QueryHandle for FakeHandle {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Closed);
        }
        self.table.executed.lock().unwrap().push(sql.to_string());
        if let Some(err) = self.table.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let limit = number_after(sql, "LIMIT").unwrap_or(usize::MAX);
        let offset = number_after(sql, "OFFSET").unwrap_or(0);
        let end = offset.saturating_add(limit).min(self.table.rows);
        let rows = (offset.min(end)..end)
            .map(|id| Record::from_columns(&self.columns, [Value::Int(id as i64)]))
            .collect();
        self.pending = Some(rows);
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Record>, DbError> {
        self.pending.take().ok_or(DbError::NoResult)
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if !self.closed {
            self.closed = true;
            self.table.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub fn connection_reset() -> DbError {
    DbError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}
