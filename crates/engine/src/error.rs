use prefsync_core::CoreError;
use prefsync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid reset transition: {0}")]
    InvalidResetTransition(String),
}
