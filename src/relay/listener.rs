use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::store::Connector;

use super::handler::{Closed, ConnectionHandler};

/// Accepts relay clients and gives each one its own task
pub struct Listener {
    config: Arc<RelayConfig>,
    connector: Arc<dyn Connector>,
}

impl Listener {
    pub fn new(config: Arc<RelayConfig>, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Bind `0.0.0.0:<listen_port>`
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], self.config.listen_port))).await
    }

    /// Accept until accepting fails; the error is returned to the caller.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    return Err(e);
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            spawn_connection(
                stream,
                addr.to_string(),
                self.config.clone(),
                self.connector.clone(),
            );
        }
    }
}

/// Spawn a handler task for one connection
pub fn spawn_connection<S>(
    stream: S,
    addr: String,
    config: Arc<RelayConfig>,
    connector: Arc<dyn Connector>,
) -> JoinHandle<Closed>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut handler = ConnectionHandler::new(config, connector);
        handler.handle_connection(stream, addr).await
    })
}
