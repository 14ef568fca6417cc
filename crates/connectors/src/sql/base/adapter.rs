use crate::sql::base::error::{ConnectorError, DbError};
use async_trait::async_trait;
use model::records::row::Record;

/// A live session against the data source.
///
/// A handle is owned by exactly one pagination session. Dropping it
/// releases the underlying driver connection, so a session abandoned
/// mid-iteration does not leak; `close` does the same eagerly and may be
/// called any number of times.
#[async_trait]
pub trait QueryHandle: Send + Sync {
    /// Runs `sql` and buffers its result set for `fetch_all`.
    async fn execute(&mut self, sql: &str) -> Result<(), DbError>;

    /// Returns every row of the most recent execution, in result order.
    /// Fails with [`DbError::NoResult`] when nothing is pending.
    async fn fetch_all(&mut self) -> Result<Vec<Record>, DbError>;

    /// Column names of the most recent execution.
    fn columns(&self) -> &[String];

    async fn close(&mut self) -> Result<(), DbError>;

    fn is_closed(&self) -> bool;
}

/// Opens query handles. Shared between sessions; every call yields an
/// independent handle, so concurrent workers never share one.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn QueryHandle>, ConnectorError>;
}
