use thiserror::Error;

/// All errors coming from the query/fetch layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Low‐level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PostgreSQL error: {0}")]
    PgError(#[from] tokio_postgres::Error),

    #[error("MySQL error: {0}")]
    MySqlError(#[from] mysql_async::Error),

    /// The handle was closed before the call.
    #[error("Query handle is closed")]
    Closed,

    /// `fetch_all` was called with no pending result set.
    #[error("No pending result set; execute a query first")]
    NoResult,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DbError {
    /// Whether the session behind the handle is gone, so the handle must be
    /// reopened before another attempt.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            DbError::Io(_) => true,
            DbError::PgError(err) => err.is_closed(),
            DbError::MySqlError(err) => matches!(
                err,
                mysql_async::Error::Io(_) | mysql_async::Error::Driver(_)
            ),
            DbError::Closed | DbError::NoResult | DbError::Unknown(_) => false,
        }
    }
}

/// Errors happening during connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("TLS configuration failed: {0}")]
    TlsConfig(#[from] native_tls::Error),

    #[error("PostgreSQL connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// Any other failure to establish a session.
    #[error("Connection failed: {0}")]
    Other(String),
}

impl ConnectorError {
    /// Configuration problems that no amount of retrying will fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConnectorError::InvalidUrl(_) | ConnectorError::UnsupportedDriver(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failures_mean_the_session_is_gone() {
        let err = DbError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(err.is_connection_loss());
        assert!(!DbError::Unknown("syntax error".into()).is_connection_loss());
        assert!(!DbError::Closed.is_connection_loss());
    }

    #[test]
    fn url_and_driver_errors_are_configuration() {
        assert!(ConnectorError::InvalidUrl("nope".into()).is_configuration());
        assert!(ConnectorError::UnsupportedDriver("oracle".into()).is_configuration());
        assert!(!ConnectorError::Other("refused".into()).is_configuration());
    }
}
