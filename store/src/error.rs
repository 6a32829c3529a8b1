use thiserror::Error;

/// Failure of a bundle repository or checkpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisted state exists but cannot be trusted.
    #[error("database is corrupted: {0}")]
    Corruption(String),
}
