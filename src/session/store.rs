//! Session backing store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

/// A value stored under a session key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Self::Str(v.to_owned()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Self::Str(v) }
}

/// The persisted part of a session: its payload and absolute deadline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub values: HashMap<String, Value>,
    pub deadline: DateTime<Utc>,
}

impl Record {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self { values: HashMap::new(), deadline }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }
}

/// The backing store could not be reached or returned garbage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

/// Persistence for session records, keyed by session identity.
///
/// Each call must be atomic with respect to the others for the same token:
/// two requests carrying one cookie may race, but neither may observe or
/// leave a half-written record.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// The live record for `token`. Unknown and expired tokens are `None`.
    async fn find(&self, token: &str) -> Result<Option<Record>, StoreError>;

    /// Inserts or replaces the record for `token`.
    async fn commit(&self, token: &str, record: &Record) -> Result<(), StoreError>;

    /// Replaces the record for `token` only while a live one exists.
    /// Returns `false`, writing nothing, when the token was deleted or has
    /// expired since it was loaded.
    async fn update(&self, token: &str, record: &Record) -> Result<bool, StoreError>;

    /// Removes `token`. Removing an unknown token is not an error.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;
}

/// In-process session store.
///
/// Records live in a sharded concurrent map; every operation locks only the
/// shard holding its key.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every expired record.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.records.retain(|_, record| !record.is_expired(now));
    }

    /// Spawns a task that purges expired records every `interval`.
    ///
    /// Must be called from within a tokio runtime. Abort the returned
    /// handle to stop it.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let before = store.len();
                store.purge_expired();
                debug!(purged = before.saturating_sub(store.len()), "session cleanup");
            }
        })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, token: &str) -> Result<Option<Record>, StoreError> {
        let now = Utc::now();
        let found = self.records.get(token)
            .map(|record| (!record.is_expired(now)).then(|| record.clone()));
        match found {
            None => Ok(None),
            Some(Some(record)) => Ok(Some(record)),
            Some(None) => {
                self.records.remove_if(token, |_, record| record.is_expired(now));
                Ok(None)
            }
        }
    }

    async fn commit(&self, token: &str, record: &Record) -> Result<(), StoreError> {
        self.records.insert(token.to_owned(), record.clone());
        Ok(())
    }

    async fn update(&self, token: &str, record: &Record) -> Result<bool, StoreError> {
        let now = Utc::now();
        match self.records.get_mut(token) {
            Some(mut live) if !live.is_expired(now) => {
                *live = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.records.remove(token);
        Ok(())
    }
}
