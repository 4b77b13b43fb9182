use super::budget::TimeBudget;
use crate::config::types::PipelineConfig;
use crate::event::normalize;
use crate::sink::{DeliveryBuffer, LogSink, SinkError};
use crate::source::{
    partition, EventSource, ListRequest, QueryPlanner, ResourceDescriptor, SourceError,
    ORDER_BY_TIMESTAMP_ASC,
};
use crate::storage::{format_iso8601, CheckpointError, CheckpointManager, CursorStore, WindowStart};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that abort a run. Cursor commits made before the error stay valid.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("invalid pipeline settings: {0}")]
    Settings(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every resource batch was read to its last page
    Completed,
    /// Stopped early to stay inside the time budget
    TimeBudgetExceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub window: WindowStart,
    pub outcome: RunOutcome,
    pub batches_total: usize,
    pub batches_processed: usize,
    pub events_read: u64,
    pub events_sent: u64,
    pub flushes: u64,
    pub cursor_commits: u64,
    pub cursor: Option<DateTime<Utc>>,
    /// Events of later batches older than a cursor already committed this run
    pub events_behind_cursor: u64,
}

#[derive(Debug, Default)]
struct RunState {
    running_max: Option<DateTime<Utc>>,
    events_read: u64,
    batches_processed: usize,
    events_behind_cursor: u64,
}

impl RunState {
    fn observe(&mut self, ts: DateTime<Utc>) {
        if self.running_max.map_or(true, |max| ts > max) {
            self.running_max = Some(ts);
        }
    }
}

/// Pulls IAM audit entries batch by batch, ships them through the delivery
/// buffer and advances the cursor at every flush boundary.
pub struct Pipeline {
    source: Arc<dyn EventSource>,
    sink: Arc<dyn LogSink>,
    store: Arc<dyn CursorStore>,
    planner: QueryPlanner,
    resources: Vec<ResourceDescriptor>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn EventSource>,
        sink: Arc<dyn LogSink>,
        store: Arc<dyn CursorStore>,
        resources: Vec<ResourceDescriptor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            planner: QueryPlanner::default(),
            resources,
            config,
        }
    }

    pub fn with_planner(mut self, planner: QueryPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        self.run_at(Utc::now()).await
    }

    /// Run with `now` as the wall-clock reference for the query window.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        let budget = TimeBudget::start(self.config.max_run_duration, self.config.budget_ratio);
        let policy = self
            .config
            .window_policy()
            .map_err(|e| PipelineError::Settings(e.to_string()))?;

        let mut checkpoints = CheckpointManager::new(self.store.clone());
        let window = checkpoints.window_start(now, &policy).await.map_err(|e| {
            error!(error = %e, "Failed to compute window start");
            e
        })?;

        let batches = partition(&self.resources, self.config.resource_batch_size);
        info!(
            batches = batches.len(),
            resources = self.resources.len(),
            "Processing resource batches"
        );

        let mut buffer = DeliveryBuffer::open(self.sink.clone(), self.config.queue_size);
        let mut state = RunState::default();

        let driven = self
            .drive(&batches, &window, &mut checkpoints, &mut buffer, &budget, &mut state)
            .await;

        // The buffer is released on every path so no queued event is dropped.
        let released = buffer.close().await;

        let (outcome, stats) = match (driven, released) {
            (Ok(outcome), Ok(stats)) => (outcome, stats),
            (Ok(_), Err(e)) => {
                error!(error = %e, "Final flush failed");
                return Err(e.into());
            }
            (Err(e), Ok(stats)) => {
                error!(error = %e, sent = stats.successful, "Run aborted");
                return Err(e);
            }
            (Err(e), Err(flush_err)) => {
                error!(error = %flush_err, "Final flush after failure also failed");
                error!(error = %e, "Run aborted");
                return Err(e);
            }
        };

        if let Some(max) = state.running_max {
            checkpoints.commit(max).await?;
        }

        let summary = RunSummary {
            window,
            outcome,
            batches_total: batches.len(),
            batches_processed: state.batches_processed,
            events_read: state.events_read,
            events_sent: stats.successful,
            flushes: stats.flushes,
            cursor_commits: checkpoints.commits(),
            cursor: checkpoints.last_committed(),
            events_behind_cursor: state.events_behind_cursor,
        };

        info!(
            sent = summary.events_sent,
            outcome = ?summary.outcome,
            elapsed_ms = budget.elapsed().as_millis() as u64,
            "Run finished"
        );

        Ok(summary)
    }

    async fn drive(
        &self,
        batches: &[&[ResourceDescriptor]],
        window: &WindowStart,
        checkpoints: &mut CheckpointManager,
        buffer: &mut DeliveryBuffer,
        budget: &TimeBudget,
        state: &mut RunState,
    ) -> Result<RunOutcome, PipelineError> {
        let start = window.to_iso8601();

        for (index, batch) in batches.iter().enumerate() {
            let filter = self.planner.build(batch, &start);
            info!(batch = index, resources = batch.len(), filter = %filter, "Processing batch");

            // Cursor committed by earlier batches of this run, if any
            let committed_floor = if checkpoints.commits() > 0 {
                checkpoints.last_committed()
            } else {
                None
            };
            let mut behind = 0u64;

            let mut request = ListRequest {
                resource_names: QueryPlanner::resource_names(batch),
                filter,
                order_by: ORDER_BY_TIMESTAMP_ASC.to_string(),
                page_size: self.config.page_size,
                page_token: None,
            };

            loop {
                let page = self.source.list_entries(&request).await.map_err(|e| {
                    error!(batch = index, error = %e, "Failed to fetch log entries");
                    e
                })?;
                debug!(batch = index, entries = page.entries.len(), "Fetched page");

                for entry in page.entries {
                    let event = normalize(entry);
                    let ts = event.timestamp();

                    buffer.send(event).await?;
                    state.events_read += 1;

                    if let Some(ts) = ts {
                        if committed_floor.is_some_and(|floor| ts < floor) {
                            behind += 1;
                        }
                        state.observe(ts);
                    }

                    if buffer.is_empty() {
                        if let Some(max) = state.running_max {
                            checkpoints.commit(max).await?;
                        }
                        if budget.exceeded() {
                            info!(
                                elapsed_ms = budget.elapsed().as_millis() as u64,
                                "Time budget exceeded, saving progress and exiting"
                            );
                            report_behind(index, behind, committed_floor);
                            state.events_behind_cursor += behind;
                            return Ok(RunOutcome::TimeBudgetExceeded);
                        }
                    }
                }

                match page.next_page_token {
                    Some(token) => request.page_token = Some(token),
                    None => break,
                }
            }

            report_behind(index, behind, committed_floor);
            state.events_behind_cursor += behind;
            state.batches_processed += 1;

            if buffer.is_empty() {
                if let Some(max) = state.running_max {
                    checkpoints.commit(max).await?;
                }
            }

            if index + 1 < batches.len() && budget.exceeded() {
                info!(
                    elapsed_ms = budget.elapsed().as_millis() as u64,
                    remaining_batches = batches.len() - index - 1,
                    "Time budget exceeded, saving progress and exiting"
                );
                return Ok(RunOutcome::TimeBudgetExceeded);
            }
        }

        Ok(RunOutcome::Completed)
    }
}

/// Batches share one window start but commit a shared cursor, so a later batch
/// can return events older than what an earlier batch already committed. A
/// crash before the next commit would leave those events behind the cursor.
fn report_behind(batch: usize, behind: u64, floor: Option<DateTime<Utc>>) {
    if behind == 0 {
        return;
    }
    if let Some(floor) = floor {
        warn!(
            batch,
            events = behind,
            cursor = %format_iso8601(&floor),
            "Batch returned events older than the cursor committed by earlier batches"
        );
    }
}
