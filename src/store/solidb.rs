//! SoliDB native driver adapter
//!
//! After the magic header every exchange is one command frame followed by
//! one response frame: `[length: 4 bytes BE][msgpack payload]`. A session
//! authenticates once against the admin database and then issues `insert`
//! commands. The server does not create databases or collections on insert,
//! so a namespace that is missing is created and the insert retried once.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{Connector, StoreSession, StoreTarget};
use crate::error::{StoreError, StoreResult};

/// Magic header sent at the start of a driver connection
pub const DRIVER_MAGIC: &[u8] = b"solidb-drv-v1\0";

/// Maximum driver message size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Driver commands used by the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Auth {
        database: String,
        username: String,
        password: String,
    },

    CreateDatabase {
        name: String,
    },

    CreateCollection {
        database: String,
        name: String,
        #[serde(rename = "type")]
        collection_type: Option<String>,
    },

    Insert {
        database: String,
        collection: String,
        #[serde(default)]
        key: Option<String>,
        document: Value,
    },
}

/// Error variants as reported by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DriverError {
    ConnectionError(String),
    ProtocolError(String),
    DatabaseError(String),
    AuthError(String),
    TransactionError(String),
    MessageTooLarge,
    InvalidCommand(String),
    ServerError(String),
}

impl From<DriverError> for StoreError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::AuthError(msg) => StoreError::Auth(msg),
            DriverError::ConnectionError(msg) => StoreError::Connection(msg),
            DriverError::ProtocolError(msg) | DriverError::InvalidCommand(msg) => {
                StoreError::Protocol(msg)
            }
            DriverError::MessageTooLarge => StoreError::Protocol("Message too large".to_string()),
            DriverError::DatabaseError(msg)
            | DriverError::TransactionError(msg)
            | DriverError::ServerError(msg) => StoreError::Database(msg),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriverResponse {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_id: Option<String>,
    },
    Error {
        error: DriverError,
    },
}

/// Encode a driver message with its big-endian length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> StoreResult<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(msg)
        .map_err(|e| StoreError::Protocol(format!("Serialization failed: {}", e)))?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(StoreError::Protocol("Message too large".to_string()));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> StoreResult<T> {
    rmp_serde::from_slice(data)
        .map_err(|e| StoreError::Protocol(format!("Deserialization failed: {}", e)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SoliDbConnector;

impl SoliDbConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SoliDbConnector {
    async fn connect(&self, target: &StoreTarget) -> StoreResult<Box<dyn StoreSession>> {
        let addr = target.addr();
        let mut stream = TcpStream::connect(&addr).await.map_err(|e| {
            StoreError::Connection(format!("Failed to connect to {}: {}", addr, e))
        })?;

        stream
            .set_nodelay(true)
            .map_err(|e| StoreError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        stream.write_all(DRIVER_MAGIC).await.map_err(|e| {
            StoreError::Connection(format!("Failed to send magic header: {}", e))
        })?;

        let mut session = SoliDbSession::new(stream);
        session
            .send(&Command::Auth {
                database: target.database.clone(),
                username: target.user.clone(),
                password: target.password.clone(),
            })
            .await?;

        tracing::debug!("Authenticated driver session to {}", target);
        Ok(Box::new(session))
    }
}

pub struct SoliDbSession {
    stream: TcpStream,
    /// `(database, collection)` pairs known to exist
    ensured: HashSet<(String, String)>,
    /// Set while a command awaits its response. Still set on entry means an
    /// earlier exchange was abandoned and the stream is out of sync.
    in_flight: bool,
    closed: bool,
}

impl SoliDbSession {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            ensured: HashSet::new(),
            in_flight: false,
            closed: false,
        }
    }

    async fn send(&mut self, command: &Command) -> StoreResult<Option<Value>> {
        if self.closed {
            return Err(StoreError::Connection("Session closed".to_string()));
        }
        if self.in_flight {
            return Err(StoreError::Connection(
                "Session unusable after an interrupted request".to_string(),
            ));
        }

        let data = encode_message(command)?;
        self.in_flight = true;

        self.stream
            .write_all(&data)
            .await
            .map_err(|e| StoreError::Connection(format!("Write failed: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| StoreError::Connection(format!("Flush failed: {}", e)))?;

        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| StoreError::Connection(format!("Read length failed: {}", e)))?;

        let msg_len = u32::from_be_bytes(len_buf) as usize;
        if msg_len > MAX_MESSAGE_SIZE {
            return Err(StoreError::Protocol("Message too large".to_string()));
        }

        let mut payload = vec![0u8; msg_len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| StoreError::Connection(format!("Read payload failed: {}", e)))?;
        self.in_flight = false;

        match decode_message::<DriverResponse>(&payload)? {
            DriverResponse::Ok { data, .. } => Ok(data),
            DriverResponse::Error { error } => Err(error.into()),
        }
    }

    /// Create `database` and `collection`, accepting ones that already exist.
    async fn ensure_namespace(&mut self, database: &str, collection: &str) -> StoreResult<()> {
        tracing::info!("Creating missing namespace {}.{}", database, collection);

        tolerate_existing(
            self.send(&Command::CreateDatabase {
                name: database.to_string(),
            })
            .await,
        )?;
        tolerate_existing(
            self.send(&Command::CreateCollection {
                database: database.to_string(),
                name: collection.to_string(),
                collection_type: None,
            })
            .await,
        )
    }
}

fn is_not_found(err: &StoreError) -> bool {
    matches!(err, StoreError::Database(msg) if msg.contains("not found"))
}

fn tolerate_existing(result: StoreResult<Option<Value>>) -> StoreResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(StoreError::Database(msg)) if msg.contains("already exists") => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl StoreSession for SoliDbSession {
    async fn insert(&mut self, database: &str, collection: &str, document: Value) -> StoreResult<()> {
        let namespace = (database.to_string(), collection.to_string());
        let command = Command::Insert {
            database: database.to_string(),
            collection: collection.to_string(),
            key: None,
            document,
        };

        match self.send(&command).await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) && !self.ensured.contains(&namespace) => {
                self.ensure_namespace(database, collection).await?;
                self.send(&command).await?;
            }
            Err(e) => return Err(e),
        }

        self.ensured.insert(namespace);
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Driver session shutdown: {}", e);
        }
    }
}
