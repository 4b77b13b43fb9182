use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field value of a normalized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<EventValue>),
    Map(BTreeMap<String, EventValue>),
}

impl EventValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EventValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, EventValue>> {
        match self {
            EventValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for EventValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => EventValue::Null,
            serde_json::Value::Bool(b) => EventValue::Bool(b),
            serde_json::Value::Number(n) => EventValue::Number(n),
            serde_json::Value::String(s) => EventValue::String(s),
            serde_json::Value::Array(items) => {
                EventValue::List(items.into_iter().map(EventValue::from).collect())
            }
            serde_json::Value::Object(map) => EventValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, EventValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        EventValue::String(value.to_string())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        EventValue::String(value)
    }
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        EventValue::Bool(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        EventValue::Number(value.into())
    }
}

impl From<BTreeMap<String, String>> for EventValue {
    fn from(map: BTreeMap<String, String>) -> Self {
        EventValue::Map(
            map.into_iter()
                .map(|(key, value)| (key, EventValue::String(value)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_structure() {
        let value = EventValue::from(json!({
            "methodName": "SetIAMPolicy",
            "status": {},
            "numResponseItems": 2,
            "authorizationInfo": [{"granted": true}],
            "request": null
        }));

        let map = value.as_map().unwrap();
        assert_eq!(map["methodName"].as_str(), Some("SetIAMPolicy"));
        assert_eq!(map["numResponseItems"], EventValue::Number(2.into()));
        assert_eq!(map["request"], EventValue::Null);
        assert_eq!(
            map["authorizationInfo"],
            EventValue::List(vec![EventValue::Map(BTreeMap::from([(
                "granted".to_string(),
                EventValue::Bool(true)
            )]))])
        );
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let value = EventValue::Map(BTreeMap::from([
            ("a".to_string(), EventValue::from(1i64)),
            ("b".to_string(), EventValue::from("x")),
            ("c".to_string(), EventValue::Null),
        ]));

        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"a":1,"b":"x","c":null}"#
        );
    }
}
