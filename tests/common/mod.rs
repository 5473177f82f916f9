//! Common test utilities for relay tests
//!
//! Provides shared helpers for:
//! - Starting a relay on an ephemeral port backed by a `MemoryStore`
//! - Sending raw frames and reading responses

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use solilog::{Connector, Listener, MemoryStore, RelayConfig};
use solilog_client::protocol::{read_frame, write_frame, Frame, Response};
use tokio::net::TcpStream;

pub fn test_config() -> RelayConfig {
    RelayConfig::new(0, "127.0.0.1", 6745)
}

pub async fn start_relay(store: &MemoryStore) -> SocketAddr {
    start_relay_with(Arc::new(store.clone()), test_config()).await
}

pub async fn start_relay_with(connector: Arc<dyn Connector>, config: RelayConfig) -> SocketAddr {
    let listener = Listener::new(Arc::new(config), connector);
    let socket = listener.bind().await.expect("Failed to bind relay");
    let port = socket.local_addr().unwrap().port();

    tokio::spawn(async move {
        let _ = listener.serve(socket).await;
    });

    SocketAddr::from(([127, 0, 0, 1], port))
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("Failed to connect to relay")
}

pub async fn send_json(stream: &mut TcpStream, value: &Value) {
    let body = serde_json::to_vec(value).unwrap();
    write_frame(stream, &body).await.unwrap();
}

/// Read one response; `None` once the relay has closed the connection.
pub async fn recv(stream: &mut TcpStream) -> Option<Response> {
    match read_frame(stream, 1024 * 1024).await {
        Ok(Some(Frame::Data(body))) => Some(Response::from_json(&body).unwrap()),
        Ok(Some(Frame::End)) => panic!("relay never sends an end frame"),
        Ok(None) | Err(_) => None,
    }
}
