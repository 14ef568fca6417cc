use crate::error::CliError;
use connectors::{
    adapter::{Driver, connector},
    sql::base::{adapter::Connector, error::DbError},
};
use std::sync::Arc;
use tracing::{error, info};

/// Opens a handle and checks that `SELECT 1` answers 1.
pub async fn ping(driver: Driver, url: &str) -> Result<(), CliError> {
    info!(%driver, "Pinging database");

    let mut handle = connector(driver, url).connect().await.map_err(|err| {
        error!(%driver, %err, "Connection failed");
        CliError::Connection(err)
    })?;

    let result = async {
        handle.execute("SELECT 1 AS ping").await?;
        handle.fetch_all().await
    }
    .await;
    handle.close().await?;

    let value = result?
        .first()
        .and_then(|row| row.get_value("ping").as_i64())
        .ok_or_else(|| CliError::Unexpected("ping returned no result".into()))?;

    if value != 1 {
        return Err(CliError::Unexpected(format!(
            "ping returned unexpected result: {value}"
        )));
    }

    info!(%driver, "Ping succeeded");
    Ok(())
}

/// Runs a row count query and reads its single `row_count` value.
pub async fn count_rows(connector: &Arc<dyn Connector>, sql: &str) -> Result<usize, CliError> {
    let mut handle = connector.connect().await?;
    let result = async {
        handle.execute(sql).await?;
        handle.fetch_all().await
    }
    .await;
    handle.close().await?;

    let count = result?
        .first()
        .map(|row| row.get_value("row_count"))
        .and_then(|value| value.as_i64())
        .ok_or(DbError::NoResult)?;

    usize::try_from(count).map_err(|_| CliError::Unexpected(format!("negative row count: {count}")))
}
