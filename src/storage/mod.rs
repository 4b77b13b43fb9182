pub mod checkpoint;
pub mod duckdb;
pub mod memory;
pub mod traits;

pub use checkpoint::{
    format_iso8601, parse_iso8601, window_start, CheckpointError, CheckpointManager, WindowPolicy,
    WindowStart,
};
pub use traits::{CursorStore, StorageError};
