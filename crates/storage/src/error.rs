use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}
