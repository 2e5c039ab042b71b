//! Application context and route assembly.
//!
//! ```text
//! Recover → RequestLogger → SecureHeaders → Router
//!                                             ├─ /static, /ping
//!                                             ├─ dynamic:   SessionManager → CsrfGuard → Authenticate → handler
//!                                             └─ protected: dynamic → RequireAuthentication → handler
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::fault;
use crate::handler::{BoxedHandler, Handler};
use crate::handlers;
use crate::method::Method;
use crate::middleware::{
    Authenticate, Chain, CsrfGuard, Recover, RequestLogger, RequireAuthentication, SecureHeaders,
};
use crate::models::{Snippets, Users};
use crate::render::{Renderer, TemplateData};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::session::{Session, SessionManager, SessionStore};
use crate::static_files;
use crate::status::Status;

/// Where the authorization gate sends anonymous visitors.
pub const LOGIN_PATH: &str = "/user/login";

/// Session key for the one-shot message shown on the next rendered page.
pub const FLASH_KEY: &str = "flash";

/// Shared state every handler works with. Built once at startup.
pub struct App {
    pub(crate) config: Config,
    pub(crate) sessions: SessionManager,
    pub(crate) users: Arc<dyn Users>,
    pub(crate) snippets: Arc<dyn Snippets>,
    pub(crate) renderer: Arc<dyn Renderer>,
    secret: Vec<u8>,
}

impl App {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        users: Arc<dyn Users>,
        snippets: Arc<dyn Snippets>,
        renderer: Arc<dyn Renderer>,
    ) -> Arc<Self> {
        let sessions = SessionManager::new(store)
            .lifetime(config.session_lifetime())
            .secure(config.secure_cookies())
            .debug(config.debug);
        let secret = config.secret_bytes();
        Arc::new(Self { config, sessions, users, snippets, renderer, secret })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The full service: outer chain around the router.
    pub fn routes(self: &Arc<Self>) -> BoxedHandler {
        let debug = self.config.debug;

        let dynamic = Chain::new()
            .with(self.sessions.clone())
            .with(CsrfGuard::new(&self.secret).secure(self.config.secure_cookies()).debug(debug))
            .with(Authenticate::new(Arc::clone(&self.users)).debug(debug));
        let protected = dynamic.append(RequireAuthentication::new(LOGIN_PATH));

        let router = Router::new()
            .on(Method::Get, "/static/{*filepath}", static_files::serve_dir(self.config.static_dir.clone()))
            .on(Method::Get, "/ping", handlers::ping)
            .route(Method::Get, "/", dynamic.then(self.endpoint(handlers::home)))
            .route(Method::Get, "/snippet/view/{id}", dynamic.then(self.endpoint(handlers::snippet_view)))
            .route(Method::Get, "/user/signup", dynamic.then(self.endpoint(handlers::user_signup)))
            .route(Method::Post, "/user/signup", dynamic.then(self.endpoint(handlers::user_signup_post)))
            .route(Method::Get, "/user/login", dynamic.then(self.endpoint(handlers::user_login)))
            .route(Method::Post, "/user/login", dynamic.then(self.endpoint(handlers::user_login_post)))
            .route(Method::Get, "/about", dynamic.then(self.endpoint(handlers::about)))
            .route(Method::Get, "/snippet/create", protected.then(self.endpoint(handlers::snippet_create)))
            .route(Method::Post, "/snippet/create", protected.then(self.endpoint(handlers::snippet_create_post)))
            .route(Method::Post, "/user/logout", protected.then(self.endpoint(handlers::user_logout_post)))
            .route(Method::Get, "/user/account", protected.then(self.endpoint(handlers::account)))
            .route(
                Method::Get,
                "/account/password/update",
                protected.then(self.endpoint(handlers::account_password_update)),
            )
            .route(
                Method::Post,
                "/account/password/update",
                protected.then(self.endpoint(handlers::account_password_update_post)),
            );

        Chain::new()
            .with(Recover::new(debug))
            .with(RequestLogger)
            .with(SecureHeaders)
            .then_boxed(router.into_handler())
    }

    /// Adapts an application handler to the [`Handler`] shape, answering
    /// any [`AppError`] with a logged `500`.
    fn endpoint<F, Fut>(self: &Arc<Self>, f: F) -> impl Handler + use<F, Fut>
    where
        F: Fn(Arc<App>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, AppError>> + Send + 'static,
    {
        let app = Arc::clone(self);
        move |req: Request| {
            let debug = app.config.debug;
            let fut = f(Arc::clone(&app), req);
            async move {
                match fut.await {
                    Ok(res) => res,
                    Err(e) => fault::server_error(&e, debug),
                }
            }
        }
    }

    /// The request's session. Only routes outside the dynamic chain lack
    /// one, and those never call this.
    pub(crate) fn session<'r>(&self, req: &'r Request) -> Result<&'r Session, AppError> {
        req.session().ok_or(AppError::MissingContext("a session"))
    }

    /// Page data common to every page. Pops the flash message, so call it
    /// once per rendered response.
    pub(crate) fn template_data(&self, req: &Request) -> TemplateData {
        let mut data = TemplateData::new();
        data.flash = req.session().and_then(|session| session.pop_string(FLASH_KEY));
        data.is_authenticated = req.auth().is_authenticated();
        data.csrf_token = req.csrf_token();
        data
    }

    /// Renders `page` fully before anything is written, so a template
    /// failure becomes a clean `500` instead of a half-sent page.
    pub(crate) fn render(&self, status: Status, page: &str, data: &TemplateData) -> Result<Response, AppError> {
        let body = self.renderer.render(page, data)?;
        Ok(Response::builder()
            .status(status)
            .bytes(self.renderer.content_type(), body))
    }
}
