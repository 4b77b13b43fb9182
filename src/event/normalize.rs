use super::value::EventValue;
use crate::source::entry::{MonitoredResource, RawEntry, RawTimestamp};
use crate::storage::{format_iso8601, parse_iso8601};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const RESOURCE_FIELD: &str = "resource";
/// Client-side handle some sources attach to entries; never shipped
pub const LOGGER_FIELD: &str = "logger";

/// A sink-ready record: field name to value, ordered by field name.
///
/// The parsed timestamp rides along for cursor tracking but is not part of
/// the serialized record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedEvent {
    fields: BTreeMap<String, EventValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl NormalizedEvent {
    pub fn fields(&self) -> &BTreeMap<String, EventValue> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&EventValue> {
        self.fields.get(field)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn into_fields(self) -> BTreeMap<String, EventValue> {
        self.fields
    }
}

impl Serialize for NormalizedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn flatten_resource(resource: MonitoredResource) -> EventValue {
    EventValue::Map(BTreeMap::from([
        ("type".to_string(), EventValue::String(resource.resource_type)),
        ("labels".to_string(), EventValue::from(resource.labels)),
    ]))
}

/// Convert a raw source entry into its sink-ready form.
///
/// Native timestamps become ISO-8601 strings, the `logger` field is dropped
/// and the resource record becomes a plain mapping. Everything else passes
/// through unchanged.
pub fn normalize(entry: RawEntry) -> NormalizedEvent {
    let RawEntry {
        timestamp,
        resource,
        mut fields,
    } = entry;

    fields.remove(LOGGER_FIELD);

    let timestamp = match timestamp {
        Some(RawTimestamp::Native(ts)) => {
            fields.insert(TIMESTAMP_FIELD.to_string(), EventValue::String(format_iso8601(&ts)));
            Some(ts)
        }
        Some(RawTimestamp::Text(text)) => {
            let parsed = parse_iso8601(&text);
            fields.insert(TIMESTAMP_FIELD.to_string(), EventValue::String(text));
            parsed
        }
        None => fields
            .get(TIMESTAMP_FIELD)
            .and_then(EventValue::as_str)
            .and_then(parse_iso8601),
    };

    if let Some(resource) = resource {
        fields.insert(RESOURCE_FIELD.to_string(), flatten_resource(resource));
    }

    NormalizedEvent { fields, timestamp }
}
