pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod store;

pub use config::{LogMode, RelayConfig};
pub use error::{DispatchError, FieldError, SessionError, StoreError, StoreResult, WriteError};
pub use relay::{spawn_connection, ConnectionHandler, Listener, LogPayload, Record, SessionManager, StoreWriter};
pub use store::{Connector, MemoryStore, SoliDbConnector, StoreSession, StoreTarget};
