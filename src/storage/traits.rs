use async_trait::async_trait;

/// Durable home of the pipeline cursor: a single ISO-8601 timestamp string.
///
/// Writes overwrite the previous value (last write wins). Only one run is
/// expected to use a store at a time.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>, StorageError>;

    async fn commit(&self, cursor: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<duckdb::Error> for StorageError {
    fn from(err: duckdb::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}
