use super::{LogSink, SinkError};
use crate::event::NormalizedEvent;
use std::sync::Arc;

pub const DEFAULT_QUEUE_SIZE: usize = 3000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events the sink confirmed
    pub successful: u64,
    /// Completed flushes
    pub flushes: u64,
}

/// Accumulates normalized events and delivers them to the sink in groups of
/// `queue_size`.
///
/// Open one per run and finish it with [`DeliveryBuffer::close`], which
/// flushes whatever is still pending. Right after `send` returns,
/// [`DeliveryBuffer::is_empty`] is true exactly when that send triggered a
/// flush.
pub struct DeliveryBuffer {
    sink: Arc<dyn LogSink>,
    queue_size: usize,
    pending: Vec<NormalizedEvent>,
    stats: DeliveryStats,
}

impl DeliveryBuffer {
    pub fn open(sink: Arc<dyn LogSink>, queue_size: usize) -> Self {
        let queue_size = queue_size.max(1);
        Self {
            sink,
            queue_size,
            pending: Vec::with_capacity(queue_size),
            stats: DeliveryStats::default(),
        }
    }

    pub async fn send(&mut self, event: NormalizedEvent) -> Result<(), SinkError> {
        self.pending.push(event);
        if self.pending.len() >= self.queue_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Deliver all pending events. Events of a failed flush are dropped from
    /// the buffer; the cursor has not moved past them, so the next run
    /// fetches them again.
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let events = std::mem::replace(&mut self.pending, Vec::with_capacity(self.queue_size));
        let count = events.len();

        if let Err(e) = self.sink.post(&events).await {
            tracing::error!(events = count, error = %e, "Flush to sink failed");
            return Err(e);
        }

        self.stats.successful += count as u64;
        self.stats.flushes += 1;
        tracing::debug!(
            events = count,
            total_sent = self.stats.successful,
            "Flushed delivery buffer"
        );
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn successful_count(&self) -> u64 {
        self.stats.successful
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    /// Final flush. Returns the delivery stats of the whole buffer lifetime.
    pub async fn close(mut self) -> Result<DeliveryStats, SinkError> {
        self.flush().await?;
        Ok(self.stats)
    }
}

impl Drop for DeliveryBuffer {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                pending = self.pending.len(),
                "Delivery buffer dropped with undelivered events"
            );
        }
    }
}
