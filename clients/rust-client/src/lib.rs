//! solilog Rust client
//!
//! Wire protocol and client for the solilog relay, which persists log
//! records into SoliDB collections.
//!
//! # Example
//!
//! ```no_run
//! use solilog_client::{LogEntry, RelayClientBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), solilog_client::ClientError> {
//!     let mut client = RelayClientBuilder::new("127.0.0.1:8707")
//!         .credentials("admin", "secret")
//!         .app("shop")
//!         .timeout_ms(1000)
//!         .connect()
//!         .await?;
//!
//!     client.write("error", "payment gateway unreachable").await?;
//!
//!     client.push("audit", LogEntry::from_value(serde_json::json!({
//!         "user": "alice",
//!         "action": "login",
//!     })));
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod protocol;

pub use client::{RelayClient, RelayClientBuilder};
pub use protocol::{ClientError, Frame, FrameError, LogEntry, LogRequest, Response};
