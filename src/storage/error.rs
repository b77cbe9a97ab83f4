use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Why the history backend could not persist or read transitions
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("history database unavailable: {0}")]
    Unavailable(String),

    #[error("history schema migration failed: {0}")]
    Migration(String),

    #[error("history query failed: {0}")]
    Query(String),

    /// A stored row could not be turned back into a transition
    #[error("corrupt history row: {0}")]
    CorruptRow(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io) => StorageError::Io(io),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::CorruptRow(err.to_string())
            }
            other => StorageError::Query(other.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}
