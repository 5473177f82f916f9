use std::sync::Arc;

use crate::config::RelayConfig;
use crate::error::{SessionError, StoreError};
use crate::store::{Connector, StoreSession, StoreTarget};

use super::record::Record;

/// Lazily opened store session for one connection.
///
/// The first record that needs the store supplies the credentials; every
/// later record reuses the session whatever credentials it carries.
pub struct SessionManager {
    config: Arc<RelayConfig>,
    connector: Arc<dyn Connector>,
    session: Option<Box<dyn StoreSession>>,
}

impl SessionManager {
    pub fn new(config: Arc<RelayConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            session: None,
        }
    }

    pub fn is_established(&self) -> bool {
        self.session.is_some()
    }

    pub async fn ensure_session(
        &mut self,
        record: &Record,
    ) -> Result<&mut dyn StoreSession, SessionError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => open(&self.config, self.connector.as_ref(), record).await?,
        };
        Ok(self.session.insert(session).as_mut())
    }

    /// Close the session if one was opened. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
            tracing::debug!("Store session closed");
        }
    }
}

async fn open(
    config: &RelayConfig,
    connector: &dyn Connector,
    record: &Record,
) -> Result<Box<dyn StoreSession>, SessionError> {
    let user = record.user().map_err(SessionError::MissingCredential)?;
    let password = record.password().map_err(SessionError::MissingCredential)?;
    let target = StoreTarget::new(config, user, password);

    let result = match tokio::time::timeout(config.connect_timeout(), connector.connect(&target))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(config.connect_timeout_ms)),
    };

    match result {
        Ok(session) => {
            tracing::debug!("Store session opened: {}", target);
            Ok(session)
        }
        Err(e) => {
            tracing::error!("Store connection to {} failed: {}", target, e);
            Err(SessionError::Connect(e))
        }
    }
}
