use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Connector, StoreSession, StoreTarget};
use crate::error::{StoreError, StoreResult};

/// In-process document store.
///
/// Clones share state, so a test can hand one clone to the relay as its
/// [`Connector`] and inspect the other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, String>,
    documents: HashMap<(String, String), Vec<Value>>,
    connect_attempts: Vec<StoreTarget>,
    sessions_opened: usize,
    sessions_closed: usize,
    insert_failure: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `user`/`password` when connecting
    pub fn with_account(self, user: &str, password: &str) -> Self {
        self.state
            .lock()
            .accounts
            .insert(user.to_string(), password.to_string());
        self
    }

    /// Make every insert fail with `message`, or succeed again with `None`
    pub fn fail_inserts(&self, message: Option<&str>) {
        self.state.lock().insert_failure = message.map(str::to_string);
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Value> {
        self.state
            .lock()
            .documents
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_documents(&self) -> usize {
        self.state.lock().documents.values().map(Vec::len).sum()
    }

    pub fn connect_attempts(&self) -> Vec<StoreTarget> {
        self.state.lock().connect_attempts.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.lock().sessions_closed
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, target: &StoreTarget) -> StoreResult<Box<dyn StoreSession>> {
        let mut state = self.state.lock();
        state.connect_attempts.push(target.clone());

        if state.accounts.get(&target.user) != Some(&target.password) {
            return Err(StoreError::Auth("Invalid credentials".to_string()));
        }

        state.sessions_opened += 1;
        Ok(Box::new(MemorySession {
            store: self.clone(),
            closed: false,
        }))
    }
}

struct MemorySession {
    store: MemoryStore,
    closed: bool,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn insert(&mut self, database: &str, collection: &str, document: Value) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Connection("Session closed".to_string()));
        }

        let mut state = self.store.state.lock();
        if let Some(msg) = &state.insert_failure {
            return Err(StoreError::Database(msg.clone()));
        }
        state
            .documents
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .push(document);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.state.lock().sessions_closed += 1;
        }
    }
}
