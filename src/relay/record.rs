use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::FieldError;

pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const APP: &str = "app";
pub const LEVEL: &str = "level";
pub const LOG: &str = "log";

/// The `log` field of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    Text(String),
    /// Non-string values have already been replaced by `""`
    Structured(BTreeMap<String, String>),
}

/// One decoded request body
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Decode a frame body; anything but a JSON object is rejected.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Map<String, Value>>(body).map(Self::from_map)
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get_str(&self, field: &'static str) -> Result<&str, FieldError> {
        match self.fields.get(field) {
            None => Err(FieldError::Missing(field)),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(FieldError::WrongType {
                field,
                expected: "a string",
                found: json_type(other),
            }),
        }
    }

    pub fn user(&self) -> Result<&str, FieldError> {
        self.get_str(USER)
    }

    pub fn password(&self) -> Result<&str, FieldError> {
        self.get_str(PASSWORD)
    }

    /// Target database; missing or non-string yields `""`
    pub fn app(&self) -> &str {
        self.get_str(APP).unwrap_or_default()
    }

    /// Target collection; missing or non-string yields `""`
    pub fn level(&self) -> &str {
        self.get_str(LEVEL).unwrap_or_default()
    }

    pub fn payload(&self) -> Result<LogPayload, FieldError> {
        match self.fields.get(LOG) {
            Some(Value::String(text)) => Ok(LogPayload::Text(text.clone())),
            Some(Value::Object(map)) => Ok(LogPayload::Structured(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                    .collect(),
            )),
            other => Err(FieldError::WrongType {
                field: LOG,
                expected: "a string or an object of strings",
                found: other.map(json_type).unwrap_or("nothing"),
            }),
        }
    }
}

pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::from_map(map),
            _ => panic!("test records must be objects"),
        }
    }

    #[test]
    fn test_from_json_requires_object() {
        assert!(Record::from_json(br#"{"app":"db1"}"#).is_ok());
        assert!(Record::from_json(b"[1,2,3]").is_err());
        assert!(Record::from_json(b"\"text\"").is_err());
        assert!(Record::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_credentials() {
        let rec = record(json!({"user": "a", "password": 7}));
        assert_eq!(rec.user(), Ok("a"));
        assert_eq!(
            rec.password(),
            Err(FieldError::WrongType {
                field: "password",
                expected: "a string",
                found: "number",
            })
        );

        let rec = record(json!({}));
        assert_eq!(rec.user(), Err(FieldError::Missing("user")));
    }

    #[test]
    fn test_namespace_is_permissive() {
        let rec = record(json!({"app": 3}));
        assert_eq!(rec.app(), "");
        assert_eq!(rec.level(), "");

        let rec = record(json!({"app": "db1", "level": "col1"}));
        assert_eq!(rec.app(), "db1");
        assert_eq!(rec.level(), "col1");
    }

    #[test]
    fn test_text_payload() {
        let rec = record(json!({"log": "hello"}));
        assert_eq!(rec.payload(), Ok(LogPayload::Text("hello".to_string())));
    }

    #[test]
    fn test_structured_payload_coerces_non_strings() {
        let rec = record(json!({"log": {"level": "x", "count": 3, "nested": {"a": 1}}}));
        let LogPayload::Structured(fields) = rec.payload().unwrap() else {
            panic!("Expected structured payload");
        };
        assert_eq!(fields["level"], "x");
        assert_eq!(fields["count"], "");
        assert_eq!(fields["nested"], "");
    }

    #[test]
    fn test_unsupported_payloads() {
        let err = record(json!({"log": 42})).payload().unwrap_err();
        assert!(matches!(err, FieldError::WrongType { found: "number", .. }));

        let err = record(json!({"log": ["a"]})).payload().unwrap_err();
        assert!(matches!(err, FieldError::WrongType { found: "array", .. }));

        let err = record(json!({})).payload().unwrap_err();
        assert!(matches!(err, FieldError::WrongType { found: "nothing", .. }));
    }
}
