use async_trait::async_trait;
use connectors::sql::base::{
    adapter::{Connector, QueryHandle},
    error::{ConnectorError, DbError},
};
use engine_core::{
    cache::{PageCache, memory::MemoryCacheBackend},
    context::{SessionContext, SessionOptions},
    retry::RetryPolicy,
};
use model::{core::value::Value, records::row::Record};
use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroUsize,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const REVIEWS_TEMPLATE: &str =
    "SELECT id, customer_id, body FROM reviews ORDER BY id LIMIT {limit} OFFSET {offset}";

/// An in-memory `reviews` table reached through the regular connector
/// seam. Every statement is logged; failures can be scripted globally or
/// for a given offset.
pub struct MemoryWarehouse {
    rows: usize,
    columns: Vec<String>,
    log: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<DbError>>,
    failures_at: Mutex<HashMap<usize, VecDeque<DbError>>>,
    refuse_connects: AtomicUsize,
    connects: AtomicUsize,
    open_handles: AtomicUsize,
}

impl MemoryWarehouse {
    pub fn new(rows: usize) -> Arc<Self> {
        Arc::new(MemoryWarehouse {
            rows,
            columns: ["id", "customer_id", "body"].map(String::from).to_vec(),
            log: Mutex::default(),
            failures: Mutex::default(),
            failures_at: Mutex::default(),
            refuse_connects: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            open_handles: AtomicUsize::new(0),
        })
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(WarehouseConnector(self.clone()))
    }

    /// The next statement fails with `err`.
    pub fn fail_next(&self, err: DbError) {
        self.failures.lock().unwrap().push_back(err);
    }

    /// The next statement reading `offset` fails with `err`.
    pub fn fail_at(&self, offset: usize, err: DbError) {
        self.failures_at
            .lock()
            .unwrap()
            .entry(offset)
            .or_default()
            .push_back(err);
    }

    /// The next `n` connection attempts are refused.
    pub fn refuse_connects(&self, n: usize) {
        self.refuse_connects.store(n, Ordering::SeqCst);
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn offsets_read(&self) -> Vec<usize> {
        self.statements()
            .iter()
            .filter_map(|sql| number_after(sql, "OFFSET"))
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn run(&self, sql: &str) -> Result<Vec<Record>, DbError> {
        self.log.lock().unwrap().push(sql.to_string());

        let offset = number_after(sql, "OFFSET").unwrap_or(0);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = self
            .failures_at
            .lock()
            .unwrap()
            .get_mut(&offset)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let limit = number_after(sql, "LIMIT").unwrap_or(usize::MAX);
        let end = offset.saturating_add(limit).min(self.rows);
        Ok((offset.min(end)..end).map(|id| self.row(id)).collect())
    }

    fn row(&self, id: usize) -> Record {
        Record::from_columns(
            &self.columns,
            [
                Value::Int(id as i64),
                Value::Int((id % 37) as i64),
                Value::String(format!("review #{id}")),
            ],
        )
    }
}

pub fn number_after(sql: &str, keyword: &str) -> Option<usize> {
    let start = sql.find(keyword)? + keyword.len();
    sql[start..]
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}

pub fn connection_reset() -> DbError {
    DbError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

struct WarehouseConnector(Arc<MemoryWarehouse>);

#[async_trait]
impl Connector for WarehouseConnector {
    async fn connect(&self) -> Result<Box<dyn QueryHandle>, ConnectorError> {
        let warehouse = &self.0;
        let refused = warehouse
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ConnectorError::Other("connection refused".into()));
        }

        warehouse.connects.fetch_add(1, Ordering::SeqCst);
        warehouse.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(WarehouseHandle {
            warehouse: warehouse.clone(),
            pending: None,
            closed: false,
        }))
    }
}

struct WarehouseHandle {
    warehouse: Arc<MemoryWarehouse>,
    pending: Option<Vec<Record>>,
    closed: bool,
}

impl WarehouseHandle {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.warehouse.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl QueryHandle for WarehouseHandle {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Closed);
        }
        self.pending = Some(self.warehouse.run(sql)?);
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Record>, DbError> {
        self.pending.take().ok_or(DbError::NoResult)
    }

    fn columns(&self) -> &[String] {
        &self.warehouse.columns
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for WarehouseHandle {
    fn drop(&mut self) {
        self.release();
    }
}

pub fn options(page_size: usize, max_pages: Option<usize>) -> SessionOptions {
    SessionOptions {
        page_size: NonZeroUsize::new(page_size).unwrap(),
        max_pages,
        retry: Some(RetryPolicy::new(3, 2.0).with_backoff_unit(Duration::from_millis(100))),
        metrics: true,
    }
}

pub fn session(warehouse: &Arc<MemoryWarehouse>, options: SessionOptions) -> SessionContext {
    SessionContext::new(warehouse.connector(), options)
}

pub fn memory_cache() -> PageCache {
    PageCache::new(Arc::new(MemoryCacheBackend::new()))
}
