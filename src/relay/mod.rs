//! Relay protocol handling
//!
//! Clients stream length-prefixed JSON records over TCP; each record is
//! written to the backing store and answered with one response frame.
//!
//! # Protocol Overview
//!
//! - **Request Frame**: `[length: 4 bytes LE][JSON object]`
//! - **Response Frame**: `[length: 4 bytes LE]{"success": bool, "message": string}`
//! - **End of session**: a request header with length `<= 0` and no body
//!
//! Request fields: `user`, `password` (only read until the connection has a
//! store session), `app` (database), `level` (collection), `log` (string or
//! object of strings).

pub use solilog_client::protocol::{
    encode_frame, read_frame, write_frame, Frame, FrameError, Response, MAX_FRAME_SIZE,
};

pub mod handler;
pub mod listener;
pub mod record;
pub mod session;
pub mod writer;

pub use handler::ConnectionHandler;
pub use listener::{spawn_connection, Listener};
pub use record::{LogPayload, Record};
pub use session::SessionManager;
pub use writer::{timestamp, StoreWriter, TIME_FORMAT};
