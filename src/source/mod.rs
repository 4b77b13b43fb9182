pub mod cloud_logging;
pub mod entry;
pub mod query;

use async_trait::async_trait;
use thiserror::Error;

pub use cloud_logging::CloudLoggingSource;
pub use entry::{MonitoredResource, RawEntry, RawTimestamp};
pub use query::{partition, QueryPlanner, ResourceDescriptor, IAM_METHOD_ALLOWLIST};

pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const ORDER_BY_TIMESTAMP_ASC: &str = "timestamp asc";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("log source returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid log entry: {0}")]
    InvalidEntry(String),
}

/// One page request against the event source.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub resource_names: Vec<String>,
    pub filter: String,
    pub order_by: String,
    pub page_size: u32,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EntryPage {
    pub entries: Vec<RawEntry>,
    pub next_page_token: Option<String>,
}

/// Paginated, filterable source of log entries.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_entries(&self, request: &ListRequest) -> Result<EntryPage, SourceError>;
}
