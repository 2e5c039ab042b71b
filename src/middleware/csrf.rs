//! Anti-forgery tokens bound to the session identity.
//!
//! The token is `HMAC-SHA256(secret, session id)`, so it is stable for the
//! life of a session identity (any number of open forms stay valid) and
//! cannot be produced without the server secret. Renewing the identity on
//! login or logout rotates the token with it.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use super::{Middleware, Next};
use crate::error::AppError;
use crate::fault;
use crate::request::Request;
use crate::response::Response;
use crate::session::Session;
use crate::status::Status;

type HmacSha256 = Hmac<Sha256>;

/// Form field carrying the token on state-changing submissions.
pub const FORM_FIELD: &str = "csrf_token";

/// Header accepted in place of the form field.
pub const HEADER_NAME: &str = "x-csrf-token";

/// Cookie echoing the token back to the browser.
pub const COOKIE_NAME: &str = "csrf_token";

fn mac(secret: &[u8], session_id: &str) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(session_id.as_bytes());
    mac
}

/// Per-request view of the CSRF token, available to handlers through
/// [`Request::csrf_token`].
#[derive(Clone)]
pub struct CsrfContext {
    secret: Arc<[u8]>,
    session: Session,
}

impl CsrfContext {
    /// The token for the current session, assigning the session an
    /// identity first if it is new.
    pub fn token(&self) -> String {
        let id = self.session.id();
        URL_SAFE_NO_PAD.encode(mac(&self.secret, &id).finalize().into_bytes())
    }

    /// Constant-time check of a submitted token. A session without an
    /// identity has never issued a token, so nothing verifies against it.
    pub fn verify(&self, submitted: &str) -> bool {
        let Some(id) = self.session.peek_id() else { return false };
        let Ok(tag) = URL_SAFE_NO_PAD.decode(submitted.trim()) else { return false };
        mac(&self.secret, &id).verify_slice(&tag).is_ok()
    }
}

impl Request {
    /// The CSRF token to embed in forms, if this request passed through
    /// [`CsrfGuard`].
    pub fn csrf_token(&self) -> Option<String> {
        self.extensions().get::<CsrfContext>().map(CsrfContext::token)
    }
}

fn submitted_token(req: &Request) -> Option<String> {
    if let Some(token) = req.header(HEADER_NAME) {
        return Some(token.to_owned());
    }
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(req.body())
        .ok()?
        .into_iter()
        .find(|(name, _)| name == FORM_FIELD)
        .map(|(_, value)| value)
}

/// Rejects state-changing requests whose token does not match the session
/// with `400 Bad Request`, before any later stage or handler runs.
///
/// Must sit inside [`SessionManager`](crate::session::SessionManager).
pub struct CsrfGuard {
    secret: Arc<[u8]>,
    secure: bool,
    debug: bool,
}

impl CsrfGuard {
    pub fn new(secret: &[u8]) -> Self {
        Self { secret: Arc::from(secret), secure: true, debug: false }
    }

    /// Whether the token cookie carries `Secure`.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn cookie(&self, token: String) -> String {
        Cookie::build((COOKIE_NAME, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
            .to_string()
    }
}

#[async_trait]
impl Middleware for CsrfGuard {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let Some(session) = req.session().cloned() else {
            return fault::server_error(&AppError::MissingContext("a session"), self.debug);
        };
        let ctx = CsrfContext { secret: Arc::clone(&self.secret), session };

        if !req.method().is_safe() {
            let verified = submitted_token(&req).is_some_and(|token| ctx.verify(&token));
            if !verified {
                warn!(method = %req.method(), path = req.path(), "rejected request with missing or invalid csrf token");
                return fault::client_error(Status::BadRequest);
            }
        }

        req.extensions_mut().insert(ctx.clone());
        let mut res = next.run(req).await;
        if ctx.session.peek_id().is_some() {
            res.append_header("set-cookie", self.cookie(ctx.token()));
        }
        res
    }
}
