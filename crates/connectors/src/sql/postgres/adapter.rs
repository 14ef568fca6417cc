use crate::sql::{
    base::{
        adapter::{Connector, QueryHandle},
        error::{ConnectorError, DbError},
        row::DbRow,
    },
    postgres::utils::connect_client,
};
use async_trait::async_trait;
use model::records::row::Record;
use tokio_postgres::{Client, Row};
use tracing::debug;

/// Opens one `tokio-postgres` client per handle.
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
}

impl PgConnector {
    pub fn new(url: impl Into<String>) -> Self {
        PgConnector { url: url.into() }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn QueryHandle>, ConnectorError> {
        let client = connect_client(&self.url).await?;
        debug!("Opened Postgres query handle");
        Ok(Box::new(PgQueryHandle::new(client)))
    }
}

pub struct PgQueryHandle {
    client: Option<Client>,
    columns: Vec<String>,
    pending: Option<Vec<Row>>,
}

impl PgQueryHandle {
    pub fn new(client: Client) -> Self {
        PgQueryHandle {
            client: Some(client),
            columns: Vec::new(),
            pending: None,
        }
    }
}

#[async_trait]
impl QueryHandle for PgQueryHandle {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        let client = self.client.as_ref().ok_or(DbError::Closed)?;

        // Preparing first gives column names even for an empty result.
        let statement = client.prepare(sql).await?;
        let rows = client.query(&statement, &[]).await?;

        self.columns = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();
        self.pending = Some(rows);
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Record>, DbError> {
        let rows = self.pending.take().ok_or(DbError::NoResult)?;
        Ok(rows
            .iter()
            .map(|row| DbRow::PostgresRow(row).to_record(&self.columns))
            .collect())
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.pending = None;
        if self.client.take().is_some() {
            debug!("Closed Postgres query handle");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}
