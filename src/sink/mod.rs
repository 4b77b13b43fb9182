pub mod buffer;
pub mod log_analytics;

use crate::event::NormalizedEvent;
use async_trait::async_trait;
use thiserror::Error;

pub use buffer::{DeliveryBuffer, DeliveryStats, DEFAULT_QUEUE_SIZE};
pub use log_analytics::LogAnalyticsSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to encode events: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sink rejected {events} events with status {status}: {message}")]
    Rejected {
        status: u16,
        events: usize,
        message: String,
    },

    #[error("invalid shared key: {0}")]
    InvalidSharedKey(String),
}

/// Destination for batches of normalized events.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver `events`. On error some of them may still have arrived.
    async fn post(&self, events: &[NormalizedEvent]) -> Result<(), SinkError>;
}
