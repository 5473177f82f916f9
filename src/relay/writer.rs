use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::WriteError;
use crate::store::StoreSession;

use super::record::{LogPayload, Record};

/// Format of the `time` field of stored documents and of log lines
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn timestamp() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

/// Turns records into inserts into `<app>.<level>`
pub struct StoreWriter {
    insert_timeout: Duration,
}

impl StoreWriter {
    pub fn new(insert_timeout: Duration) -> Self {
        Self { insert_timeout }
    }

    pub async fn write(
        &self,
        session: &mut dyn StoreSession,
        record: &Record,
    ) -> Result<(), WriteError> {
        let payload = record.payload().map_err(WriteError::UnsupportedPayload)?;
        let document = shape_document(payload, &timestamp());

        let insert = session.insert(record.app(), record.level(), document);
        match tokio::time::timeout(self.insert_timeout, insert).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WriteError::Insert(e.to_string())),
            Err(_) => Err(WriteError::Insert(format!(
                "timed out after {} ms",
                self.insert_timeout.as_millis()
            ))),
        }
    }
}

/// Build the stored document.
///
/// Text becomes `{time, message}`. Field maps are stored as they are, with
/// `now` added under `time` unless the map already has one.
pub fn shape_document(payload: LogPayload, now: &str) -> Value {
    match payload {
        LogPayload::Text(message) => {
            let mut doc = Map::new();
            doc.insert("time".to_string(), Value::String(now.to_string()));
            doc.insert("message".to_string(), Value::String(message));
            Value::Object(doc)
        }
        LogPayload::Structured(fields) => {
            let mut doc: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            doc.entry("time")
                .or_insert_with(|| Value::String(now.to_string()));
            Value::Object(doc)
        }
    }
}
