//! Data collaborators: users and snippets.
//!
//! The pipeline depends only on the [`Users`] and [`Snippets`] traits. The
//! in-memory implementations here back the binary and the tests; a SQL
//! implementation would slot in behind the same traits.

mod snippets;
mod users;

pub use snippets::MemorySnippets;
pub use users::MemoryUsers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// A registered account. The password hash never leaves the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no matching record found")]
    NoRecord,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Users: Send + Sync + 'static {
    /// Creates an account and returns its id. Fails with
    /// [`ModelError::DuplicateEmail`] when the address is taken.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError>;

    /// The id of the account matching both `email` and `password`, or
    /// [`ModelError::InvalidCredentials`]. Which of the two was wrong is
    /// not revealed.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;

    async fn exists(&self, id: i64) -> Result<bool, ModelError>;

    async fn get(&self, id: i64) -> Result<User, ModelError>;

    /// Replaces the password after checking `current`; a wrong `current`
    /// is [`ModelError::InvalidCredentials`].
    async fn password_update(&self, id: i64, current: &str, new: &str) -> Result<(), ModelError>;
}

#[async_trait]
pub trait Snippets: Send + Sync + 'static {
    /// Stores a snippet expiring `expires_days` from now and returns its id.
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> Result<i64, ModelError>;

    /// The unexpired snippet `id`, or [`ModelError::NoRecord`].
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;

    /// The ten most recently created unexpired snippets, newest first.
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;
}
