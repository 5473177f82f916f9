use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `log` payload of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogEntry {
    /// Stored as `{time, message}`
    Text(String),
    /// Stored as-is, with `time` added when absent
    Fields(BTreeMap<String, String>),
}

impl LogEntry {
    /// Convert arbitrary JSON into a payload the relay accepts.
    ///
    /// Objects become field maps: strings are kept, nested arrays and
    /// objects are JSON-encoded, other scalars are stringified and null
    /// becomes an empty string. Any non-object value becomes text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => LogEntry::Fields(
                map.into_iter()
                    .map(|(k, v)| (k, stringify(v)))
                    .collect(),
            ),
            other => LogEntry::Text(stringify(other)),
        }
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<&str> for LogEntry {
    fn from(text: &str) -> Self {
        LogEntry::Text(text.to_string())
    }
}

impl From<String> for LogEntry {
    fn from(text: String) -> Self {
        LogEntry::Text(text)
    }
}

impl From<BTreeMap<String, String>> for LogEntry {
    fn from(fields: BTreeMap<String, String>) -> Self {
        LogEntry::Fields(fields)
    }
}

/// One record sent to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    pub user: String,
    pub password: String,
    /// Target database
    pub app: String,
    /// Target collection
    pub level: String,
    pub log: LogEntry,
}
