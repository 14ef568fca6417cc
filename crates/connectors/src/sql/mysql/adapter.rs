use crate::sql::base::{
    adapter::{Connector, QueryHandle},
    error::{ConnectorError, DbError},
    row::DbRow,
};
use async_trait::async_trait;
use model::records::row::Record;
use mysql_async::{Column, Conn, Opts, Row, prelude::Queryable};
use tracing::debug;

/// Opens one `mysql_async` connection per handle.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    url: String,
}

impl MySqlConnector {
    pub fn new(url: impl Into<String>) -> Self {
        MySqlConnector { url: url.into() }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn QueryHandle>, ConnectorError> {
        let opts =
            Opts::from_url(&self.url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let conn = Conn::new(opts).await?;
        debug!("Opened MySQL query handle");
        Ok(Box::new(MySqlQueryHandle::new(conn)))
    }
}

pub struct MySqlQueryHandle {
    conn: Option<Conn>,
    columns: Vec<String>,
    pending: Option<Vec<Row>>,
}

impl MySqlQueryHandle {
    pub fn new(conn: Conn) -> Self {
        MySqlQueryHandle {
            conn: Some(conn),
            columns: Vec::new(),
            pending: None,
        }
    }
}

fn column_names(columns: &[Column]) -> Vec<String> {
    columns
        .iter()
        .map(|col| col.name_str().into_owned())
        .collect()
}

#[async_trait]
impl QueryHandle for MySqlQueryHandle {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;
        let mut result = conn.query_iter(sql).await?;

        // Taken from the result set itself so an empty page still reports them.
        let columns = column_names(result.columns_ref());
        let rows: Vec<Row> = result.collect().await?;
        result.drop_result().await?;

        self.columns = columns;
        self.pending = Some(rows);
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Record>, DbError> {
        let rows = self.pending.take().ok_or(DbError::NoResult)?;
        Ok(rows
            .iter()
            .map(|row| DbRow::MySqlRow(row).to_record(&self.columns))
            .collect())
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.pending = None;
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await?;
            debug!("Closed MySQL query handle");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_async::consts::ColumnType;

    #[test]
    fn column_names_follow_result_metadata_order() {
        let columns = [
            Column::new(ColumnType::MYSQL_TYPE_LONG).with_name(b"id"),
            Column::new(ColumnType::MYSQL_TYPE_VAR_STRING).with_name(b"body"),
        ];

        assert_eq!(column_names(&columns), vec!["id", "body"]);
        assert!(column_names(&[]).is_empty());
    }
}
