//! Wire protocol shared by the relay and its clients
//!
//! Every message in either direction is `[int32 LE length][JSON body]`.
//! A length of zero or less carries no body and ends the session.

pub mod codec;
pub mod error;
pub mod request;
pub mod response;

pub use codec::{
    encode_frame, read_frame, write_end_of_session, write_frame, Frame, END_OF_SESSION,
    MAX_FRAME_SIZE,
};
pub use error::{ClientError, FrameError};
pub use request::{LogEntry, LogRequest};
pub use response::Response;
