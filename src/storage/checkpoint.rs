use super::traits::{CursorStore, StorageError};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("stored cursor '{value}' is not an ISO-8601 timestamp")]
    InvalidCursor { value: String },

    #[error("window start is outside the representable time range")]
    WindowOutOfRange,
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Render a timestamp the way cursors and event timestamps are stored:
/// RFC 3339 with a numeric offset and only as many fractional digits as needed.
pub fn format_iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parse a stored cursor. Values without an offset are taken as UTC.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Smallest step past an already-shipped event.
pub fn cursor_tick() -> Duration {
    Duration::microseconds(1)
}

/// How far back a run is allowed to look.
#[derive(Debug, Clone, Copy)]
pub struct WindowPolicy {
    /// Window used when no cursor exists yet (one trigger interval)
    pub execution_interval: Duration,
    /// Oldest start a run will ever query from
    pub max_lookback: Duration,
}

impl WindowPolicy {
    pub fn from_std(
        execution_interval: std::time::Duration,
        max_lookback: std::time::Duration,
    ) -> std::result::Result<Self, chrono::OutOfRangeError> {
        Ok(Self {
            execution_interval: Duration::from_std(execution_interval)?,
            max_lookback: Duration::from_std(max_lookback)?,
        })
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            execution_interval: Duration::minutes(5),
            max_lookback: Duration::days(7),
        }
    }
}

/// Inclusive lower bound of a run's query window and how it was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStart {
    /// No cursor yet: only the most recent execution interval is covered
    Fresh(DateTime<Utc>),
    /// One tick past the stored cursor
    Resumed(DateTime<Utc>),
    /// Cursor older than the max lookback; events before the clamp are skipped
    Clamped {
        start: DateTime<Utc>,
        stale_cursor: DateTime<Utc>,
    },
}

impl WindowStart {
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            WindowStart::Fresh(start) | WindowStart::Resumed(start) => *start,
            WindowStart::Clamped { start, .. } => *start,
        }
    }

    pub fn to_iso8601(&self) -> String {
        format_iso8601(&self.start())
    }
}

/// Pure window-start policy: a function of the stored cursor and "now" only.
pub fn window_start(
    cursor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &WindowPolicy,
) -> Result<WindowStart> {
    let Some(cursor) = cursor else {
        let start = now
            .checked_sub_signed(policy.execution_interval)
            .ok_or(CheckpointError::WindowOutOfRange)?;
        return Ok(WindowStart::Fresh(start));
    };

    if now.signed_duration_since(cursor) > policy.max_lookback {
        let start = now
            .checked_sub_signed(policy.max_lookback)
            .ok_or(CheckpointError::WindowOutOfRange)?;
        Ok(WindowStart::Clamped {
            start,
            stale_cursor: cursor,
        })
    } else {
        let start = cursor
            .checked_add_signed(cursor_tick())
            .ok_or(CheckpointError::WindowOutOfRange)?;
        Ok(WindowStart::Resumed(start))
    }
}

/// Reads the cursor once at run start and writes it back as progress is made.
///
/// Commits never move the cursor backwards: a value that is not newer than
/// the last known cursor is skipped.
pub struct CheckpointManager {
    store: Arc<dyn CursorStore>,
    last_committed: Option<DateTime<Utc>>,
    commits: u64,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CursorStore>) -> Self {
        Self {
            store,
            last_committed: None,
            commits: 0,
        }
    }

    pub async fn load(&mut self) -> Result<Option<DateTime<Utc>>> {
        tracing::info!("Loading cursor");

        let Some(value) = self.store.get().await? else {
            tracing::info!("No cursor stored yet");
            return Ok(None);
        };

        let cursor = parse_iso8601(&value).ok_or(CheckpointError::InvalidCursor { value })?;
        tracing::info!(cursor = %format_iso8601(&cursor), "Loaded cursor");

        self.last_committed = Some(cursor);
        Ok(Some(cursor))
    }

    /// Load the cursor and turn it into the start of this run's window.
    pub async fn window_start(
        &mut self,
        now: DateTime<Utc>,
        policy: &WindowPolicy,
    ) -> Result<WindowStart> {
        let cursor = self.load().await?;
        let window = window_start(cursor, now, policy)?;

        match window {
            WindowStart::Fresh(start) => {
                tracing::info!(start = %format_iso8601(&start), "Cursor unknown, covering last execution interval");
            }
            WindowStart::Resumed(start) => {
                tracing::info!(start = %format_iso8601(&start), "Resuming after stored cursor");
            }
            WindowStart::Clamped { start, stale_cursor } => {
                tracing::warn!(
                    stale_cursor = %format_iso8601(&stale_cursor),
                    start = %format_iso8601(&start),
                    max_lookback_minutes = policy.max_lookback.num_minutes(),
                    "Cursor is older than max lookback, events before the window start are skipped"
                );
            }
        }

        Ok(window)
    }

    /// Persist `ts` as the new cursor. Returns false when the commit was skipped.
    pub async fn commit(&mut self, ts: DateTime<Utc>) -> Result<bool> {
        if self.last_committed.is_some_and(|last| ts <= last) {
            tracing::debug!(cursor = %format_iso8601(&ts), "Cursor unchanged, skipping commit");
            return Ok(false);
        }

        let value = format_iso8601(&ts);
        self.store.commit(&value).await?;
        self.last_committed = Some(ts);
        self.commits += 1;
        tracing::info!(cursor = %value, "Saved cursor");
        Ok(true)
    }

    pub fn last_committed(&self) -> Option<DateTime<Utc>> {
        self.last_committed
    }

    /// Number of commits written by this manager
    pub fn commits(&self) -> u64 {
        self.commits
    }
}
