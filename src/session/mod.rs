//! Session lifecycle.
//!
//! [`SessionManager`] is the middleware stage that loads a session when a
//! request arrives and saves it when the response comes back. Handlers and
//! later stages reach the loaded [`Session`] through [`Request::session`].
//!
//! ```text
//!  absent ──cookie found──▶ loaded ─┐
//!     │                             ├─ put/remove/pop ─▶ modified ─▶ saved
//!     └──no/unknown cookie─▶ new ───┘                       └─▶ destroyed
//! ```
//!
//! The cookie only ever carries the opaque identity; the payload stays in
//! the [`SessionStore`].

mod store;

pub use store::{MemoryStore, Record, SessionStore, StoreError, Value};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeDelta, Utc};
use cookie::{Cookie, SameSite};
use tracing::{debug, error};

use crate::fault;
use crate::middleware::{resume_panic, CatchPanic, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "session";

/// Default session lifetime in hours, counted from creation or last renewal.
pub const DEFAULT_LIFETIME_HOURS: i64 = 12;

/// A fresh session identity: 256 random bits, URL-safe base64.
pub fn generate_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Unmodified,
    Modified,
    Destroyed,
}

struct State {
    token: Option<String>,
    record: Record,
    status: Status,
    // The token was loaded from (or already written to) the store.
    persisted: bool,
}

/// Handle to the current request's session.
///
/// Clones share the same state; the handle is owned by a single request
/// and the lock is never held across an await.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<State>>,
    store: Arc<dyn SessionStore>,
    lifetime: TimeDelta,
}

impl Session {
    fn new(store: Arc<dyn SessionStore>, lifetime: TimeDelta, token: Option<String>, record: Record) -> Self {
        let persisted = token.is_some();
        let state = State { token, record, status: Status::Unmodified, persisted };
        Self { state: Arc::new(Mutex::new(state)), store, lifetime }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session identity, assigning one (and scheduling a save) if this
    /// is a new session that has none yet.
    pub fn id(&self) -> String {
        let mut state = self.lock();
        if state.token.is_none() {
            state.status = Status::Modified;
        }
        state.token.get_or_insert_with(generate_token).clone()
    }

    /// The session identity if one exists, without assigning one.
    pub fn peek_id(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.lock().record.deadline
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().record.values.get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.lock().record.values.contains_key(key)
    }

    /// Sets `key`, creating it if needed.
    pub fn put(&self, key: &str, value: impl Into<Value>) {
        let mut state = self.lock();
        state.record.values.insert(key.to_owned(), value.into());
        state.status = Status::Modified;
    }

    /// Deletes `key`, leaving the rest of the session alone.
    pub fn remove(&self, key: &str) {
        let mut state = self.lock();
        if state.record.values.remove(key).is_some() {
            state.status = Status::Modified;
        }
    }

    /// Reads and deletes `key` in one step.
    ///
    /// The deletion is part of this call, not of a successful response: a
    /// popped flash message is gone even if rendering later fails. Returns
    /// `None` for absent keys and for values that are not strings.
    pub fn pop_string(&self, key: &str) -> Option<String> {
        let mut state = self.lock();
        let value = state.record.values.remove(key)?;
        state.status = Status::Modified;
        match value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Replaces the session identity, keeping the payload and restarting the
    /// lifetime. The old identity is deleted from the store immediately, so
    /// a leaked pre-renewal cookie is worthless.
    ///
    /// Call on every privilege change (login, logout).
    pub async fn renew_token(&self) -> Result<(), StoreError> {
        let old = {
            let mut state = self.lock();
            state.record.deadline = Utc::now() + self.lifetime;
            state.status = Status::Modified;
            state.persisted = false;
            state.token.replace(generate_token())
        };
        if let Some(old) = old {
            self.store.delete(&old).await?;
        }
        Ok(())
    }

    /// Deletes the session from the store and clears its payload. The
    /// response expires the cookie. A later `put` starts a new session.
    pub async fn destroy(&self) -> Result<(), StoreError> {
        let old = {
            let mut state = self.lock();
            state.record = Record::new(Utc::now() + self.lifetime);
            state.status = Status::Destroyed;
            state.persisted = false;
            state.token.take()
        };
        if let Some(old) = old {
            self.store.delete(&old).await?;
        }
        Ok(())
    }
}

/// Session accessor for handlers and stages inside the dynamic chain.
impl Request {
    /// The session loaded by [`SessionManager`], if this request passed
    /// through it.
    pub fn session(&self) -> Option<&Session> {
        self.extensions().get::<Session>()
    }
}

/// Middleware stage that loads the session before the rest of the chain
/// and saves it afterwards.
///
/// The save runs for every response the inner stages return, error
/// responses included, and only writes when the session was modified.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    lifetime: TimeDelta,
    secure: bool,
    debug: bool,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            lifetime: TimeDelta::hours(DEFAULT_LIFETIME_HOURS),
            secure: true,
            debug: false,
        }
    }

    pub fn lifetime(mut self, lifetime: TimeDelta) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Whether the cookie carries the `Secure` attribute. Only turn this off
    /// for plain-HTTP local development.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Loads the session for `token`, or starts a new one when the token is
    /// absent, unknown or expired.
    pub async fn load(&self, token: Option<&str>) -> Result<Session, StoreError> {
        let found = match token {
            Some(token) => self.store.find(token).await?.map(|record| (token.to_owned(), record)),
            None => None,
        };
        let (token, record) = match found {
            Some((token, record)) => (Some(token), record),
            None => (None, Record::new(Utc::now() + self.lifetime)),
        };
        Ok(Session::new(Arc::clone(&self.store), self.lifetime, token, record))
    }

    /// Persists `session` if it changed and returns the `Set-Cookie` value
    /// the response needs, if any.
    ///
    /// A loaded identity is only ever updated in place. If another request
    /// renewed or destroyed it in the meantime, nothing is written and no
    /// cookie is sent.
    pub async fn save(&self, session: &Session) -> Result<Option<String>, StoreError> {
        let pending = {
            let mut state = session.lock();
            match state.status {
                Status::Unmodified => return Ok(None),
                Status::Destroyed => None,
                Status::Modified => {
                    let token = state.token.get_or_insert_with(generate_token).clone();
                    state.status = Status::Unmodified;
                    let existing = std::mem::replace(&mut state.persisted, true);
                    Some((token, state.record.clone(), existing))
                }
            }
        };

        match pending {
            Some((token, record, true)) => {
                if !self.store.update(&token, &record).await? {
                    debug!("session was renewed or destroyed by another request, dropping changes");
                    return Ok(None);
                }
                Ok(Some(self.cookie(token, remaining_secs(&record))))
            }
            Some((token, record, false)) => {
                self.store.commit(&token, &record).await?;
                Ok(Some(self.cookie(token, remaining_secs(&record))))
            }
            None => Ok(Some(self.cookie(String::new(), 0))),
        }
    }

    fn cookie(&self, value: String, max_age_secs: i64) -> String {
        Cookie::build((COOKIE_NAME, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
            .to_string()
    }
}

fn remaining_secs(record: &Record) -> i64 {
    (record.deadline - Utc::now()).num_seconds().max(0)
}

#[async_trait]
impl Middleware for SessionManager {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let token = req.cookie(COOKIE_NAME);
        let session = match self.load(token.as_deref()).await {
            Ok(session) => session,
            Err(e) => return fault::server_error(&e, self.debug),
        };
        if token.is_some() && session.peek_id().is_none() {
            debug!("unknown or expired session cookie, starting a new session");
        }

        req.extensions_mut().insert(session.clone());
        let outcome = CatchPanic::new(Box::pin(next.run(req))).await;

        // Whatever the inner stages consumed (a popped flash) stays consumed,
        // even when they panicked.
        let saved = self.save(&session).await;
        let mut res = match outcome {
            Ok(res) => res,
            Err(caught) => {
                if let Err(e) = saved {
                    error!(error = %e, "session save failed after a panic");
                }
                resume_panic(caught)
            }
        };

        match saved {
            Ok(Some(cookie)) => {
                res.append_header("set-cookie", cookie);
                res.append_header("vary", "Cookie");
                res
            }
            Ok(None) => {
                res.append_header("vary", "Cookie");
                res
            }
            Err(e) => fault::server_error(&e, self.debug),
        }
    }
}
