use std::fmt;

use jar_core::JarError;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
    /// The serialized collection would not fit in the configured quota.
    QuotaExceeded { needed: usize, limit: usize },
    Config(String),
}

impl StoreError {
    /// The database file is damaged or is not SQLite at all.
    pub fn is_corrupt(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt)
            ),
            _ => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::QuotaExceeded { needed, limit } => {
                write!(f, "storage quota exceeded: {needed} bytes needed, limit is {limit}")
            }
            StoreError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

impl From<JarError> for StoreError {
    fn from(e: JarError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

impl From<StoreError> for JarError {
    fn from(e: StoreError) -> Self {
        JarError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
