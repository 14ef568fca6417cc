use connectors::sql::base::error::DbError;
use engine_core::{error::PageError, retry::RetryDisposition};

/// Decides whether a failed page fetch is worth another attempt.
///
/// Driver, network and server-side query failures are retried alike.
/// Misconfiguration and handle misuse are not, since a rerun cannot
/// change their outcome.
pub fn page_fetch_disposition(err: &PageError) -> RetryDisposition {
    match err {
        PageError::Connection(err) if err.is_configuration() => RetryDisposition::Stop,
        PageError::Connection(_) => RetryDisposition::Retry,
        PageError::Query(DbError::Closed | DbError::NoResult) => RetryDisposition::Stop,
        PageError::Query(_) => RetryDisposition::Retry,
        PageError::Template(_) | PageError::Enrichment(_) | PageError::Worker(_) => {
            RetryDisposition::Stop
        }
    }
}
