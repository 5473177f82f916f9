use thiserror::Error;

/// Typed lookup failure on a record field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field '{0}' is missing")]
    Missing(&'static str),

    #[error("field '{field}' must be {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure reported by a backing-store adapter
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

/// Could not obtain the connection's store session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Missing store credential: {0}")]
    MissingCredential(FieldError),

    #[error("Store connection failed: {0}")]
    Connect(StoreError),
}

/// Could not persist a record
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Unsupported log payload type: {0}")]
    UnsupportedPayload(FieldError),

    #[error("Insert failed: {0}")]
    Insert(String),
}

/// Per-record failure; the connection stays open
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

pub type StoreResult<T> = Result<T, StoreError>;
