use std::fmt::Display;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{ModelError, User, Users};

struct Account {
    user: User,
    hash: String,
}

/// In-process user table with Argon2id password hashes.
///
/// Emails are unique ignoring case and surrounding whitespace; the check and the insert happen under one shard lock,
/// so two concurrent signups for one address cannot both succeed. Hashing
/// runs on the blocking pool.
#[derive(Clone)]
pub struct MemoryUsers {
    accounts: Arc<DashMap<i64, Account>>,
    emails: Arc<DashMap<String, i64>>,
    next_id: Arc<AtomicI64>,
    params: Params,
}

impl Default for MemoryUsers {
    fn default() -> Self {
        Self::with_params(Params::default())
    }
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given Argon2 cost parameters for new hashes.
    pub fn with_params(params: Params) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            emails: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            params,
        }
    }

    /// Deletes account `id`. Sessions still naming it become anonymous on
    /// their next request.
    pub fn remove(&self, id: i64) {
        if let Some((_, account)) = self.accounts.remove(&id) {
            self.emails.remove(&email_key(&account.user.email));
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    async fn hash(&self, password: &str) -> Result<String, ModelError> {
        let params = self.params.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>()).map_err(backend)?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(backend)
        })
        .await
        .map_err(backend)?
    }

    async fn verify(&self, hash: String, password: &str) -> Result<bool, ModelError> {
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash).map_err(backend)?;
            Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(backend)?
    }

    fn stored_hash(&self, id: i64) -> Option<String> {
        self.accounts.get(&id).map(|account| account.hash.clone())
    }
}

/// Index key for `email`: the address as typed is kept on the user, but
/// lookups and uniqueness go through this form.
fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn backend(e: impl Display) -> ModelError {
    ModelError::Backend(e.to_string())
}

#[async_trait]
impl Users for MemoryUsers {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError> {
        let hash = self.hash(password).await?;
        match self.emails.entry(email_key(email)) {
            Entry::Occupied(_) => Err(ModelError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let user = User {
                    id,
                    name: name.to_owned(),
                    email: email.to_owned(),
                    created: Utc::now(),
                };
                self.accounts.insert(id, Account { user, hash });
                slot.insert(id);
                Ok(id)
            }
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let Some(id) = self.emails.get(&email_key(email)).map(|id| *id) else {
            return Err(ModelError::InvalidCredentials);
        };
        let Some(hash) = self.stored_hash(id) else {
            return Err(ModelError::InvalidCredentials);
        };
        if self.verify(hash, password).await? {
            Ok(id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        Ok(self.accounts.contains_key(&id))
    }

    async fn get(&self, id: i64) -> Result<User, ModelError> {
        self.accounts
            .get(&id)
            .map(|account| account.user.clone())
            .ok_or(ModelError::NoRecord)
    }

    async fn password_update(&self, id: i64, current: &str, new: &str) -> Result<(), ModelError> {
        let hash = self.stored_hash(id).ok_or(ModelError::NoRecord)?;
        if !self.verify(hash, current).await? {
            return Err(ModelError::InvalidCredentials);
        }
        let hash = self.hash(new).await?;
        let mut account = self.accounts.get_mut(&id).ok_or(ModelError::NoRecord)?;
        account.hash = hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> MemoryUsers {
        MemoryUsers::with_params(Params::new(8, 1, 1, None).expect("params"))
    }

    #[tokio::test]
    async fn authenticate_needs_both_halves() {
        let users = users();
        let id = users.insert("Alice", "alice@example.com", "pa$$word").await.expect("insert");

        assert_eq!(users.authenticate("alice@example.com", "pa$$word").await.expect("auth"), id);
        assert!(matches!(
            users.authenticate("alice@example.com", "wrong-pass").await,
            Err(ModelError::InvalidCredentials)
        ));
        assert!(matches!(
            users.authenticate("nobody@example.com", "pa$$word").await,
            Err(ModelError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_adds_no_row() {
        let users = users();
        users.insert("Dupe", "dupe@example.com", "pa$$word").await.expect("insert");
        let again = users.insert("Other", "dupe@example.com", "another-pass").await;

        assert!(matches!(again, Err(ModelError::DuplicateEmail)));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn emails_match_regardless_of_case() {
        let users = users();
        let id = users.insert("Alice", "alice@example.com", "pa$$word").await.expect("insert");

        let again = users.insert("Impostor", "Alice@Example.COM", "another-pass").await;
        assert!(matches!(again, Err(ModelError::DuplicateEmail)));
        assert_eq!(users.len(), 1);
        assert_eq!(users.authenticate(" ALICE@example.com", "pa$$word").await.expect("auth"), id);

        users.remove(id);
        users.insert("Alice", "ALICE@example.com", "pa$$word").await.expect("address is free again");
    }

    #[tokio::test]
    async fn stored_hash_is_argon2id() {
        let users = users();
        let id = users.insert("Alice", "alice@example.com", "pa$$word").await.expect("insert");
        let hash = users.stored_hash(id).expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("pa$$word"));
    }

    #[tokio::test]
    async fn password_update_checks_the_current_password() {
        let users = users();
        let id = users.insert("Alice", "alice@example.com", "pa$$word").await.expect("insert");

        assert!(matches!(
            users.password_update(id, "not-it", "new-password").await,
            Err(ModelError::InvalidCredentials)
        ));
        users.password_update(id, "pa$$word", "new-password").await.expect("update");
        assert_eq!(users.authenticate("alice@example.com", "new-password").await.expect("auth"), id);
    }

    #[tokio::test]
    async fn removed_users_stop_existing() {
        let users = users();
        let id = users.insert("Alice", "alice@example.com", "pa$$word").await.expect("insert");
        assert!(users.exists(id).await.expect("exists"));

        users.remove(id);
        assert!(!users.exists(id).await.expect("exists"));
        assert!(matches!(users.get(id).await, Err(ModelError::NoRecord)));
    }
}
