use super::traits::{CursorStore, StorageError};
use async_trait::async_trait;
use std::sync::Mutex;

/// Cursor store kept in process memory. Remembers every commit so dry runs
/// and tests can inspect how the cursor moved.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    history: Mutex<Vec<String>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a cursor, as if a previous run committed it
    pub fn with_cursor(cursor: impl Into<String>) -> Self {
        Self {
            history: Mutex::new(vec![cursor.into()]),
        }
    }

    /// All values ever written, oldest first (including the seed)
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        let history = self
            .history
            .lock()
            .map_err(|e| StorageError::Database(format!("cursor mutex poisoned: {}", e)))?;
        Ok(history.last().cloned())
    }

    async fn commit(&self, cursor: &str) -> Result<(), StorageError> {
        let mut history = self
            .history
            .lock()
            .map_err(|e| StorageError::Database(format!("cursor mutex poisoned: {}", e)))?;
        history.push(cursor.to_string());
        Ok(())
    }
}
