use crate::config::parse::load_config;
use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineError, RunOutcome};
use crate::sink::{LogAnalyticsSink, SinkError};
use crate::source::{CloudLoggingSource, SourceError};
use crate::storage::duckdb::DuckDbCursorStore;
use crate::storage::StorageError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match &config_path {
        Some(path) => info!(config_path = %path.display(), "Loading configuration"),
        None => info!("No settings file found, using defaults"),
    }

    let config = load_config(config_path.as_deref()).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    let run_id = Uuid::new_v4();
    run_pipeline(config)
        .instrument(tracing::info_span!("run", run_id = %run_id))
        .await
        .map_err(|e| e.into())
}

async fn run_pipeline(config: Config) -> Result<(), RunError> {
    let settings = &config.settings;

    info!(path = %settings.cursor.path.display(), "Opening cursor store");
    let store = Arc::new(DuckDbCursorStore::open(&settings.cursor.path)?);

    let source = Arc::new(CloudLoggingSource::new(
        settings.source.endpoint.clone(),
        config.access_token.clone(),
        settings.source.request_timeout,
    )?);

    let sink = Arc::new(
        LogAnalyticsSink::new(
            config.log_analytics_uri.clone(),
            config.workspace_id.clone(),
            &config.shared_key,
            settings.sink.log_type.clone(),
            settings.sink.request_timeout,
        )?
        .with_max_payload_bytes(settings.sink.max_payload_bytes),
    );

    info!(
        resources = config.resources.len(),
        log_type = %settings.sink.log_type,
        "Starting IAM audit log run"
    );

    let pipeline = Pipeline::new(
        source,
        sink,
        store,
        config.resources.clone(),
        settings.pipeline.clone(),
    );

    let summary = pipeline.run().await?;

    if summary.outcome == RunOutcome::TimeBudgetExceeded {
        warn!(
            batches_processed = summary.batches_processed,
            batches_total = summary.batches_total,
            "Run stopped early, remaining batches resume next run"
        );
    }

    info!(
        events_sent = summary.events_sent,
        events_read = summary.events_read,
        cursor_commits = summary.cursor_commits,
        "Sent {} IAM audit events",
        summary.events_sent
    );

    Ok(())
}
