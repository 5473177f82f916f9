use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::FrameError;

/// Largest body accepted by default (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Zero-length header: "end of session, no body follows"
pub const END_OF_SESSION: [u8; 4] = 0i32.to_le_bytes();

/// One unit read off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A frame carrying a body
    Data(Vec<u8>),
    /// A header with length <= 0
    End,
}

/// Prefix `payload` with its little-endian length.
///
/// An empty payload produces the end-of-session marker.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly before a header starts.
/// Short reads from the underlying stream are retried until the declared
/// length has been consumed.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1..]).await.map_err(eof_as_truncated)?;

    // Signed on purpose: clients that write -1 as the end marker are honoured
    let len = i32::from_le_bytes(len_buf);
    if len <= 0 {
        return Ok(Some(Frame::End));
    }

    let len = len as usize;
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(eof_as_truncated)?;
    Ok(Some(Frame::Data(payload)))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_frame(payload)?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_end_of_session<W>(writer: &mut W) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&END_OF_SESSION).await?;
    writer.flush().await?;
    Ok(())
}

fn eof_as_truncated(err: std::io::Error) -> FrameError {
    if err.kind() == ErrorKind::UnexpectedEof {
        FrameError::Truncated
    } else {
        FrameError::Io(err)
    }
}
