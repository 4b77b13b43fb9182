use super::traits::{CursorStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Cursor store backed by a single-row DuckDB table.
pub struct DuckDbCursorStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbCursorStore {
    /// Open (or create) the cursor database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to open cursor database");
            e
        })?;

        Self::from_connection(conn)
    }

    /// In-memory cursor database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cursor (
                id INTEGER PRIMARY KEY DEFAULT 1,
                value VARCHAR NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CHECK (id = 1)
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|e| StorageError::Database(format!("connection mutex poisoned: {}", e)))
}

#[async_trait]
impl CursorStore for DuckDbCursorStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare("SELECT value FROM cursor WHERE id = 1")?;
            let mut rows = stmt.query([])?;

            if let Some(row) = rows.next()? {
                let value: String = row.get(0)?;
                Ok(Some(value))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }

    async fn commit(&self, cursor: &str) -> Result<(), StorageError> {
        let conn = self.conn.clone();
        let cursor = cursor.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO cursor (id, value, updated_at)
                 VALUES (1, ?, to_timestamp(? / 1000000.0))",
                duckdb::params![cursor, Utc::now().timestamp_micros()],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_store_has_no_cursor() {
        let store = DuckDbCursorStore::in_memory().unwrap();
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_overwrites() {
        let store = DuckDbCursorStore::in_memory().unwrap();

        store.commit("2024-01-01T00:00:00+00:00").await.unwrap();
        store.commit("2024-01-01T00:05:00+00:00").await.unwrap();

        assert_eq!(
            store.get().await.unwrap().as_deref(),
            Some("2024-01-01T00:05:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_cursor_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("cursor.duckdb");

        {
            let store = DuckDbCursorStore::open(&path).unwrap();
            store.commit("2024-03-01T12:00:00.5+00:00").await.unwrap();
        }

        let store = DuckDbCursorStore::open(&path).unwrap();
        assert_eq!(
            store.get().await.unwrap().as_deref(),
            Some("2024-03-01T12:00:00.5+00:00")
        );
    }

    #[test]
    fn test_open_under_a_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = DuckDbCursorStore::open(blocker.join("cursor.duckdb"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
