//! Connection handler for the relay protocol
//!
//! Reads frames, decodes records, writes them through the connection's store
//! session and answers every frame with one response.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::RelayConfig;
use crate::error::DispatchError;
use crate::store::Connector;

use super::record::Record;
use super::session::SessionManager;
use super::writer::StoreWriter;
use super::{read_frame, write_frame, Frame, Response};

pub const FRAME_READ_FAILED: &str = "frame read failed";
pub const INVALID_CONTENT: &str = "frame body is not a valid JSON object";
pub const INTERNAL_ERROR: &str = "internal error while handling record";

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// End-of-session frame, or the peer hung up between frames
    Graceful,
    /// Unreadable frame, undecodable record or failed response write
    Error,
}

/// Handler for a single relay connection
pub struct ConnectionHandler {
    config: Arc<RelayConfig>,
    sessions: SessionManager,
    writer: StoreWriter,
}

impl ConnectionHandler {
    pub fn new(config: Arc<RelayConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            sessions: SessionManager::new(config.clone(), connector),
            writer: StoreWriter::new(config.insert_timeout()),
            config,
        }
    }

    /// Serve one connection until it closes, then release the store session
    /// and the socket.
    pub async fn handle_connection<S>(&mut self, mut stream: S, addr: String) -> Closed
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::info!("Relay connection from {}", addr);

        let closed = self.serve(&mut stream, &addr).await;

        self.sessions.close().await;
        let _ = stream.shutdown().await;

        match closed {
            Closed::Graceful => tracing::debug!("Relay connection closed: {}", addr),
            Closed::Error => tracing::warn!("Relay connection dropped after error: {}", addr),
        }
        closed
    }

    async fn serve<S>(&mut self, stream: &mut S, addr: &str) -> Closed
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let body = match read_frame(stream, self.config.max_frame_size).await {
                Ok(Some(Frame::Data(body))) => body,
                Ok(Some(Frame::End)) => {
                    send_response(stream, addr, &Response::ok()).await;
                    return Closed::Graceful;
                }
                Ok(None) => return Closed::Graceful,
                Err(e) => {
                    tracing::error!("Frame read from {} failed: {}", addr, e);
                    send_response(stream, addr, &Response::failure(FRAME_READ_FAILED)).await;
                    return Closed::Error;
                }
            };

            let record = match Record::from_json(&body) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!("{}\t[{}]", e, String::from_utf8_lossy(&body));
                    send_response(stream, addr, &Response::failure(INVALID_CONTENT)).await;
                    return Closed::Error;
                }
            };

            let response = self.dispatch_contained(&record, addr).await;
            if !send_response(stream, addr, &response).await {
                return Closed::Error;
            }
        }
    }

    /// Run [`dispatch`](Self::dispatch), turning a panic into a failure
    /// response for this record only.
    async fn dispatch_contained(&mut self, record: &Record, addr: &str) -> Response {
        match AssertUnwindSafe(self.dispatch(record)).catch_unwind().await {
            Ok(Ok(())) => Response::ok(),
            Ok(Err(e)) => {
                tracing::error!("Record from {} rejected: {}", addr, e);
                Response::failure(e.to_string())
            }
            Err(panic) => {
                tracing::error!(
                    "Panic while handling record from {}: {}",
                    addr,
                    panic_message(panic.as_ref())
                );
                Response::failure(INTERNAL_ERROR)
            }
        }
    }

    async fn dispatch(&mut self, record: &Record) -> Result<(), DispatchError> {
        let session = self.sessions.ensure_session(record).await?;
        self.writer.write(session, record).await?;
        Ok(())
    }
}

/// Returns false when the peer can no longer be written to.
async fn send_response<S>(stream: &mut S, addr: &str, response: &Response) -> bool
where
    S: AsyncWrite + Unpin,
{
    let body = match response.to_json() {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to encode response for {}: {}", addr, e);
            return false;
        }
    };

    match write_frame(stream, &body).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to send response to {}: {}", addr, e);
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::store::{MemoryStore, StoreSession, StoreTarget};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use solilog_client::protocol::encode_frame;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio_test::io::Builder;

    fn start(connector: Arc<dyn Connector>) -> (DuplexStream, JoinHandle<Closed>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let config = Arc::new(RelayConfig::new(0, "localhost", 6745));
        let task = tokio::spawn(async move {
            let mut handler = ConnectionHandler::new(config, connector);
            handler.handle_connection(server, "test".to_string()).await
        });
        (client, task)
    }

    async fn send(client: &mut DuplexStream, value: Value) {
        let body = serde_json::to_vec(&value).unwrap();
        write_frame(client, &body).await.unwrap();
    }

    async fn recv(client: &mut DuplexStream) -> Response {
        match read_frame(client, 1024).await.unwrap() {
            Some(Frame::Data(body)) => Response::from_json(&body).unwrap(),
            other => panic!("Expected a response frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_end_of_session_frame() {
        let store = MemoryStore::new();
        let (mut client, task) = start(Arc::new(store));

        client.write_all(&0i32.to_le_bytes()).await.unwrap();
        assert_eq!(recv(&mut client).await, Response::ok());
        assert_eq!(task.await.unwrap(), Closed::Graceful);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    fn response_frame(response: &Response) -> Vec<u8> {
        encode_frame(&response.to_json().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let store = MemoryStore::new().with_account("a", "b");
        let body = serde_json::to_vec(
            &json!({"user": "a", "password": "b", "app": "db1", "level": "col1", "log": "split"}),
        )
        .unwrap();
        let (head, tail) = body.split_at(body.len() / 2);
        let len = (body.len() as i32).to_le_bytes();

        let stream = Builder::new()
            .read(&len[..1])
            .read(&len[1..])
            .read(head)
            .read(tail)
            .write(&response_frame(&Response::ok()))
            .read(&[0, 0])
            .read(&[0, 0])
            .write(&response_frame(&Response::ok()))
            .build();

        let mut handler = ConnectionHandler::new(
            Arc::new(RelayConfig::new(0, "localhost", 6745)),
            Arc::new(store.clone()),
        );
        let closed = handler.handle_connection(stream, "mock".to_string()).await;

        assert_eq!(closed, Closed::Graceful);
        assert_eq!(store.documents("db1", "col1")[0]["message"], "split");
        assert_eq!(store.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_peer_hangup_between_frames() {
        let (client, task) = start(Arc::new(MemoryStore::new()));
        drop(client);
        assert_eq!(task.await.unwrap(), Closed::Graceful);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_read_failure() {
        let (mut client, task) = start(Arc::new(MemoryStore::new()));

        client.write_all(&10i32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(recv(&mut client).await, Response::failure(FRAME_READ_FAILED));
        assert_eq!(task.await.unwrap(), Closed::Error);
    }

    #[tokio::test]
    async fn test_malformed_json_closes_connection() {
        let store = MemoryStore::new().with_account("a", "b");
        let (mut client, task) = start(Arc::new(store.clone()));

        write_frame(&mut client, b"{oops").await.unwrap();
        send(&mut client, json!({"user": "a", "password": "b", "log": "never"})).await;

        assert_eq!(recv(&mut client).await, Response::failure(INVALID_CONTENT));
        assert_eq!(task.await.unwrap(), Closed::Error);
        assert_eq!(store.total_documents(), 0);
    }

    #[tokio::test]
    async fn test_failures_keep_connection_open() {
        let store = MemoryStore::new().with_account("a", "b");
        let (mut client, task) = start(Arc::new(store.clone()));

        send(&mut client, json!({"app": "db1", "level": "col1", "log": "x"})).await;
        let resp = recv(&mut client).await;
        assert!(!resp.success);
        assert!(resp.message.contains("user"));

        send(&mut client, json!({"user": "a", "password": "b", "app": "db1", "level": "col1", "log": 42})).await;
        let resp = recv(&mut client).await;
        assert!(!resp.success);
        assert!(resp.message.contains("Unsupported log payload type"));

        send(&mut client, json!({"app": "db1", "level": "col1", "log": "ok"})).await;
        assert_eq!(recv(&mut client).await, Response::ok());

        client.write_all(&0i32.to_le_bytes()).await.unwrap();
        assert_eq!(recv(&mut client).await, Response::ok());
        assert_eq!(task.await.unwrap(), Closed::Graceful);

        assert_eq!(store.documents("db1", "col1").len(), 1);
        assert_eq!(store.sessions_opened(), 1);
        assert_eq!(store.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_session_closed_after_read_failure() {
        let store = MemoryStore::new().with_account("a", "b");
        let (mut client, task) = start(Arc::new(store.clone()));

        send(&mut client, json!({"user": "a", "password": "b", "app": "d", "level": "c", "log": "x"})).await;
        assert_eq!(recv(&mut client).await, Response::ok());

        client.write_all(&[1, 0]).await.unwrap();
        client.shutdown().await.unwrap();
        assert_eq!(recv(&mut client).await, Response::failure(FRAME_READ_FAILED));
        assert_eq!(task.await.unwrap(), Closed::Error);
        assert_eq!(store.sessions_closed(), 1);
    }

    struct PanickingConnector {
        store: MemoryStore,
    }

    struct PanickingSession {
        inner: Box<dyn StoreSession>,
    }

    #[async_trait]
    impl Connector for PanickingConnector {
        async fn connect(&self, target: &StoreTarget) -> StoreResult<Box<dyn StoreSession>> {
            let inner = self.store.connect(target).await?;
            Ok(Box::new(PanickingSession { inner }))
        }
    }

    #[async_trait]
    impl StoreSession for PanickingSession {
        async fn insert(&mut self, database: &str, collection: &str, document: Value) -> StoreResult<()> {
            if document.get("message") == Some(&json!("boom")) {
                panic!("driver exploded");
            }
            self.inner.insert(database, collection, document).await
        }

        async fn close(&mut self) {
            self.inner.close().await;
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained_to_one_record() {
        let store = MemoryStore::new().with_account("a", "b");
        let connector = PanickingConnector { store: store.clone() };
        let (mut client, task) = start(Arc::new(connector));

        send(&mut client, json!({"user": "a", "password": "b", "app": "d", "level": "c", "log": "boom"})).await;
        assert_eq!(recv(&mut client).await, Response::failure(INTERNAL_ERROR));

        send(&mut client, json!({"app": "d", "level": "c", "log": "fine"})).await;
        assert_eq!(recv(&mut client).await, Response::ok());

        drop(client);
        assert_eq!(task.await.unwrap(), Closed::Graceful);
        assert_eq!(store.documents("d", "c").len(), 1);
        assert_eq!(store.sessions_closed(), 1);
    }
}
