use std::time::Duration;

use tokio::net::TcpStream;

use super::{with_timeout, RelayClient};
use crate::protocol::ClientError;

pub struct RelayClientBuilder {
    addr: String,
    user: String,
    password: String,
    app: String,
    timeout_ms: Option<u64>,
}

impl RelayClientBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            user: String::new(),
            password: String::new(),
            app: String::new(),
            timeout_ms: None,
        }
    }

    /// Store credentials forwarded with every record
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// Target database for every record
    pub fn app(mut self, app: &str) -> Self {
        self.app = app.to_string();
        self
    }

    /// Bound on connecting and on each request/response round trip
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub async fn connect(self) -> Result<RelayClient, ClientError> {
        let timeout = self.timeout_ms.map(Duration::from_millis);
        let stream = open_stream(&self.addr, timeout).await?;

        Ok(RelayClient::new(
            stream,
            self.addr,
            self.user,
            self.password,
            self.app,
            timeout,
        ))
    }
}

pub(crate) async fn open_stream(
    addr: &str,
    timeout: Option<Duration>,
) -> Result<TcpStream, ClientError> {
    let stream = with_timeout(timeout, async move {
        TcpStream::connect(addr).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to {}: {}", addr, e))
        })
    })
    .await?;

    stream
        .set_nodelay(true)
        .map_err(|e| ClientError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;
    Ok(stream)
}
