//! Authentication context and the authorization gate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Middleware, Next};
use crate::fault;
use crate::models::Users;
use crate::request::Request;
use crate::response::Response;

/// Session key holding the logged-in user's id. `0` or absent means nobody.
pub const AUTH_USER_KEY: &str = "authenticatedUserID";

/// Session key recording where an anonymous visitor was headed before
/// being sent to the login page.
pub const ORIGIN_URL_KEY: &str = "origin_url";

/// Who is making this request, as established once by [`Authenticate`].
///
/// Immutable for the rest of the request. A request that never passed
/// through [`Authenticate`] is anonymous.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AuthFact {
    authenticated: bool,
    user_id: Option<i64>,
}

impl AuthFact {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: i64) -> Self {
        Self { authenticated: true, user_id: Some(id) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }
}

impl Request {
    /// The authentication fact for this request.
    pub fn auth(&self) -> AuthFact {
        self.extensions().get::<AuthFact>().copied().unwrap_or_default()
    }
}

/// Resolves the session's user id into an [`AuthFact`].
///
/// A stored id is re-checked against the user collaborator on every
/// request, so deleting a user logs them out everywhere. A failed check is
/// a `500`, never a silent downgrade to anonymous.
pub struct Authenticate {
    users: Arc<dyn Users>,
    debug: bool,
}

impl Authenticate {
    pub fn new(users: Arc<dyn Users>) -> Self {
        Self { users, debug: false }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[async_trait]
impl Middleware for Authenticate {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let id = req.session()
            .and_then(|session| session.get_int(AUTH_USER_KEY))
            .unwrap_or(0);
        if id == 0 {
            return next.run(req).await;
        }

        match self.users.exists(id).await {
            Ok(true) => {
                req.extensions_mut().insert(AuthFact::user(id));
            }
            Ok(false) => debug!(user_id = id, "session refers to a user that no longer exists"),
            Err(e) => return fault::server_error(&e, self.debug),
        }
        next.run(req).await
    }
}

/// Lets only authenticated requests through.
///
/// Anonymous requests have their path stored under [`ORIGIN_URL_KEY`] and
/// are redirected to the login page with `303`; the wrapped handler never
/// runs. Authenticated responses are marked `Cache-Control: no-store`.
pub struct RequireAuthentication {
    login_path: &'static str,
}

impl RequireAuthentication {
    pub fn new(login_path: &'static str) -> Self {
        Self { login_path }
    }
}

#[async_trait]
impl Middleware for RequireAuthentication {
    async fn handle(&self, req: Request, next: Next) -> Response {
        if !req.auth().is_authenticated() {
            if let Some(session) = req.session() {
                session.put(ORIGIN_URL_KEY, req.path());
            }
            return Response::redirect(self.login_path);
        }

        let mut res = next.run(req).await;
        res.append_header("cache-control", "no-store");
        res
    }
}
