//! Backing document store
//!
//! The relay only needs two things from a store: open an authenticated
//! session for a set of credentials, and insert one document into a
//! database/collection. [`SoliDbConnector`] speaks the SoliDB native driver
//! protocol; [`MemoryStore`] keeps everything in process.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RelayConfig;
use crate::error::StoreResult;

pub mod memory;
pub mod solidb;

pub use memory::MemoryStore;
pub use solidb::SoliDbConnector;

pub const TARGET_SCHEME: &str = "solidb";

/// Opens store sessions. Shared by every connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &StoreTarget) -> StoreResult<Box<dyn StoreSession>>;
}

/// An authenticated handle owned by a single relay connection
#[async_trait]
pub trait StoreSession: Send {
    async fn insert(&mut self, database: &str, collection: &str, document: Value)
        -> StoreResult<()>;

    /// Release the session. Must tolerate being called more than once.
    async fn close(&mut self);
}

/// Where and as whom a session connects
#[derive(Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub host: String,
    pub port: u16,
    /// Database the credentials are checked against
    pub database: String,
    pub user: String,
    pub password: String,
}

impl StoreTarget {
    pub fn new(config: &RelayConfig, user: &str, password: &str) -> Self {
        Self {
            host: config.store_host.clone(),
            port: config.store_port,
            database: config.admin_database.clone(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full connection string including the password
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            TARGET_SCHEME, self.user, self.password, self.host, self.port, self.database
        )
    }
}

// Display and Debug mask the password so targets can be logged
impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:***@{}:{}/{}",
            TARGET_SCHEME, self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreTarget({})", self)
    }
}
