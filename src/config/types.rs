use crate::sink::log_analytics::{DEFAULT_LOG_TYPE, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::source::query::{ResourceDescriptor, DEFAULT_RESOURCE_BATCH_SIZE};
use crate::source::{cloud_logging, DEFAULT_PAGE_SIZE};
use crate::storage::WindowPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Validated runtime configuration, built once at startup.
#[derive(Clone)]
pub struct Config {
    pub resources: Vec<ResourceDescriptor>,
    pub workspace_id: String,
    pub shared_key: String,
    pub log_analytics_uri: String,
    pub access_token: String,
    pub settings: Settings,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("resources", &self.resources)
            .field("workspace_id", &self.workspace_id)
            .field("shared_key", &"<redacted>")
            .field("log_analytics_uri", &self.log_analytics_uri)
            .field("access_token", &"<redacted>")
            .field("settings", &self.settings)
            .finish()
    }
}

/// Tunables read from the optional settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub cursor: CursorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub resource_batch_size: usize,
    pub page_size: u32,
    pub queue_size: usize,
    #[serde(with = "humantime_serde")]
    pub execution_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_lookback: Duration,
    #[serde(with = "humantime_serde")]
    pub max_run_duration: Duration,
    pub budget_ratio: f64,
}

impl PipelineConfig {
    pub fn window_policy(&self) -> Result<WindowPolicy, chrono::OutOfRangeError> {
        WindowPolicy::from_std(self.execution_interval, self.max_lookback)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resource_batch_size: DEFAULT_RESOURCE_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            queue_size: crate::sink::DEFAULT_QUEUE_SIZE,
            execution_interval: Duration::from_secs(5 * 60),
            max_lookback: Duration::from_secs(7 * 24 * 60 * 60),
            max_run_duration: Duration::from_secs(5 * 60),
            budget_ratio: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: cloud_logging::DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkConfig {
    pub log_type: String,
    pub max_payload_bytes: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log_type: DEFAULT_LOG_TYPE.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CursorConfig {
    pub path: PathBuf,
}

impl Default for CursorConfig {
    fn default() -> Self {
        let path = dirs::data_local_dir()
            .map(|dir| dir.join("iamship").join("cursor.duckdb"))
            .unwrap_or_else(|| PathBuf::from("iamship-cursor.duckdb"));
        Self { path }
    }
}
