// Collector error taxonomy.
// Storage and codec failures fail ingestion calls; timeouts are transient and
// are swallowed around alert evaluation; notification failures are only logged.

use thiserror::Error;

pub type Result<T, E = CollectorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("storage: {0}")]
    Storage(sqlx::Error),

    /// Transient backend condition (pool exhausted, database busy/locked, read timeout).
    #[error("storage timeout: {0}")]
    Timeout(String),

    #[error("codec: {0}")]
    Codec(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("notification: {0}")]
    Notification(String),
}

impl CollectorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollectorError::Timeout(_))
    }

    /// Errors the agent should retry (everything except a malformed request).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CollectorError::InvalidRequest(_))
    }
}

// Primary SQLite result codes; extended codes carry them in the low byte.
const SQLITE_BUSY: u32 = 5;
const SQLITE_LOCKED: u32 = 6;

impl From<sqlx::Error> for CollectorError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => CollectorError::Timeout(e.to_string()),
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|c| c.parse::<u32>().ok())
                    .map(|c| c & 0xff);
                if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                    CollectorError::Timeout(e.to_string())
                } else {
                    CollectorError::Storage(e)
                }
            }
            _ => CollectorError::Storage(e),
        }
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(e: serde_json::Error) -> Self {
        CollectorError::Codec(e.to_string())
    }
}
