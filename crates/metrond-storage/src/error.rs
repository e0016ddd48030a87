use metrond_common::retry::RetryError;
use sea_orm::DbErr;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("storage operation cancelled")]
    Cancelled,

    #[error("stored metric is corrupt: {0}")]
    Corrupt(String),

    #[error("snapshot io error: {0}")]
    SnapshotIo(#[source] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    SnapshotJson(#[from] serde_json::Error),
}

impl From<RetryError<DbErr>> for StorageError {
    fn from(err: RetryError<DbErr>) -> Self {
        match err.into_source() {
            Some(db) => StorageError::Db(db),
            None => StorageError::Cancelled,
        }
    }
}
