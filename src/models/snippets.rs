use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;

use super::{ModelError, Snippet, Snippets};

/// Number of snippets on the home page.
const LATEST_LIMIT: usize = 10;

/// In-process snippet table. Expired snippets stay stored but are never
/// returned.
#[derive(Clone)]
pub struct MemorySnippets {
    snippets: Arc<DashMap<i64, Snippet>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemorySnippets {
    fn default() -> Self {
        Self {
            snippets: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl MemorySnippets {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Snippets for MemorySnippets {
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> Result<i64, ModelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let created = Utc::now();
        let snippet = Snippet {
            id,
            title: title.to_owned(),
            content: content.to_owned(),
            created,
            expires: created + TimeDelta::days(expires_days),
        };
        self.snippets.insert(id, snippet);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        let now = Utc::now();
        self.snippets
            .get(&id)
            .filter(|snippet| snippet.expires > now)
            .map(|snippet| snippet.value().clone())
            .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let now = Utc::now();
        let mut live: Vec<Snippet> = self.snippets
            .iter()
            .filter(|snippet| snippet.expires > now)
            .map(|snippet| snippet.value().clone())
            .collect();
        live.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        live.truncate(LATEST_LIMIT);
        Ok(live)
    }
}
