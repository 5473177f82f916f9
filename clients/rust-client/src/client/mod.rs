mod builder;

pub use builder::RelayClientBuilder;

use builder::open_stream;

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::protocol::{
    read_frame, write_end_of_session, write_frame, ClientError, Frame, FrameError, LogEntry,
    LogRequest, Response, MAX_FRAME_SIZE,
};

/// A single relay connection.
///
/// Every record carries the credentials; the relay only looks at them
/// until its store session for this connection is established. A record
/// that finds the connection gone is sent again once over a new connection.
pub struct RelayClient {
    stream: TcpStream,
    addr: String,
    user: String,
    password: String,
    app: String,
    timeout: Option<Duration>,
    pending: VecDeque<(String, LogEntry)>,
}

impl RelayClient {
    pub(crate) fn new(
        stream: TcpStream,
        addr: String,
        user: String,
        password: String,
        app: String,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            stream,
            addr,
            user,
            password,
            app,
            timeout,
            pending: VecDeque::new(),
        }
    }

    /// Send one record and wait for its response.
    ///
    /// `level` selects the collection inside the configured app database.
    pub async fn write(
        &mut self,
        level: &str,
        entry: impl Into<LogEntry>,
    ) -> Result<Response, ClientError> {
        let request = LogRequest {
            user: self.user.clone(),
            password: self.password.clone(),
            app: self.app.clone(),
            level: level.to_string(),
            log: entry.into(),
        };
        let body = serde_json::to_vec(&request)?;

        match self.send(&body).await {
            Err(e) if is_disconnect(&e) => {
                tracing::warn!("Relay connection lost ({}), reconnecting to {}", e, self.addr);
                self.stream = open_stream(&self.addr, self.timeout).await?;
                self.send(&body).await
            }
            result => result,
        }
    }

    async fn send(&mut self, body: &[u8]) -> Result<Response, ClientError> {
        let stream = &mut self.stream;
        with_timeout(self.timeout, async move {
            write_frame(stream, body).await?;
            read_response(stream).await
        })
        .await
    }

    /// Queue a record for the next [`flush`](Self::flush).
    pub fn push(&mut self, level: &str, entry: impl Into<LogEntry>) {
        self.pending.push_back((level.to_string(), entry.into()));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Send every queued record in order.
    ///
    /// Stops at the first transport error; records not yet sent stay queued.
    pub async fn flush(&mut self) -> Result<Vec<Response>, ClientError> {
        let mut responses = Vec::with_capacity(self.pending.len());
        while let Some((level, entry)) = self.pending.pop_front() {
            match self.write(&level, entry.clone()).await {
                Ok(resp) => {
                    if !resp.success {
                        tracing::warn!("Relay rejected record for {}: {}", level, resp.message);
                    }
                    responses.push(resp);
                }
                Err(e) => {
                    self.pending.push_front((level, entry));
                    return Err(e);
                }
            }
        }
        Ok(responses)
    }

    /// Flush, announce the end of the session and close the socket.
    pub async fn close(mut self) -> Result<Response, ClientError> {
        self.flush().await?;

        let timeout = self.timeout;
        let stream = &mut self.stream;
        let resp = with_timeout(timeout, async move {
            write_end_of_session(stream).await?;
            read_response(stream).await
        })
        .await?;

        let _ = self.stream.shutdown().await;
        Ok(resp)
    }
}

/// The relay answers every frame it reads, so a closed or reset connection
/// means the record was never handled.
fn is_disconnect(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::NoResponse | ClientError::Frame(FrameError::Io(_))
    )
}

async fn read_response(stream: &mut TcpStream) -> Result<Response, ClientError> {
    match read_frame(stream, MAX_FRAME_SIZE).await? {
        Some(Frame::Data(body)) => Ok(Response::from_json(&body)?),
        Some(Frame::End) | None => Err(ClientError::NoResponse),
    }
}

pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}
