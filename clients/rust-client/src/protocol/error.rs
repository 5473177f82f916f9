use thiserror::Error;

/// Failure while reading or writing a single frame
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream inside a frame
    #[error("stream closed mid-frame")]
    Truncated,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`crate::RelayClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Relay closed the session without a response")]
    NoResponse,
}
