use super::SourceError;
use crate::event::EventValue;
use crate::storage::parse_iso8601;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Parsed by the source into a datetime
    Native(DateTime<Utc>),
    /// Delivered as text and left untouched
    Text(String),
}

/// The monitored resource a log entry was written for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// One log entry as returned by the event source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEntry {
    pub timestamp: Option<RawTimestamp>,
    pub resource: Option<MonitoredResource>,
    /// Every other field of the entry, as delivered
    pub fields: BTreeMap<String, EventValue>,
}

impl RawEntry {
    /// Build an entry from a Cloud Logging `LogEntry` JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SourceError> {
        let serde_json::Value::Object(mut object) = value else {
            return Err(SourceError::InvalidEntry(
                "log entry is not a JSON object".to_string(),
            ));
        };

        let mut passthrough = Vec::new();

        let timestamp = match object.remove("timestamp") {
            Some(serde_json::Value::String(text)) => Some(match parse_iso8601(&text) {
                Some(ts) => RawTimestamp::Native(ts),
                None => RawTimestamp::Text(text),
            }),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                tracing::warn!(value = %other, "Log entry timestamp is not a string, shipping it as is");
                passthrough.push(("timestamp".to_string(), other));
                None
            }
        };

        // Resources outside the monitored-resource shape ship as plain mappings
        let resource = match object.remove("resource") {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => match serde_json::from_value::<MonitoredResource>(value.clone()) {
                Ok(resource) => Some(resource),
                Err(e) => {
                    tracing::warn!(error = %e, "Unexpected resource shape, shipping it as is");
                    passthrough.push(("resource".to_string(), value));
                    None
                }
            },
        };

        let fields = object
            .into_iter()
            .chain(passthrough)
            .map(|(key, value)| (key, EventValue::from(value)))
            .collect();

        Ok(Self {
            timestamp,
            resource,
            fields,
        })
    }
}
