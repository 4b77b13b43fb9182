use crate::config::load_local_settings;
use crate::storage::duckdb::DuckDbCursorStore;
use crate::storage::{format_iso8601, parse_iso8601, CursorStore};
use std::path::PathBuf;

/// Print the stored cursor.
pub async fn show(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config_path)?;

    match store.get().await? {
        None => println!("No cursor stored"),
        Some(value) => match parse_iso8601(&value) {
            Some(ts) => println!("{}", format_iso8601(&ts)),
            None => {
                println!("{}", value);
                eprintln!("Warning: stored cursor is not a valid timestamp; repair it with 'iamship cursor set'");
            }
        },
    }

    Ok(())
}

/// Overwrite the stored cursor. The next run resumes just after `timestamp`.
pub async fn set(config_path: Option<PathBuf>, timestamp: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ts = parse_iso8601(timestamp)
        .ok_or_else(|| format!("'{}' is not an RFC 3339 timestamp", timestamp))?;

    let store = open_store(config_path)?;
    let previous = store.get().await?;
    let value = format_iso8601(&ts);
    store.commit(&value).await?;

    tracing::info!(previous = ?previous, cursor = %value, "Cursor overwritten");
    println!("Cursor set to {}", value);
    Ok(())
}

fn open_store(config_path: Option<PathBuf>) -> Result<DuckDbCursorStore, Box<dyn std::error::Error>> {
    let settings = load_local_settings(config_path.as_deref(), |key| std::env::var(key).ok())?;
    Ok(DuckDbCursorStore::open(&settings.cursor.path)?)
}
