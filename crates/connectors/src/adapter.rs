use crate::sql::{
    base::{adapter::Connector, error::ConnectorError},
    mysql::adapter::MySqlConnector,
    postgres::adapter::PgConnector,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[serde(alias = "pg", alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
}

impl FromStr for Driver {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::MySql),
            other => Err(ConnectorError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Postgres => write!(f, "Postgres"),
            Driver::MySql => write!(f, "MySQL"),
        }
    }
}

/// Builds the connector for `driver`. No connection is opened until a
/// session asks for a handle.
pub fn connector(driver: Driver, url: &str) -> Arc<dyn Connector> {
    match driver {
        Driver::Postgres => Arc::new(PgConnector::new(url)),
        Driver::MySql => Arc::new(MySqlConnector::new(url)),
    }
}
