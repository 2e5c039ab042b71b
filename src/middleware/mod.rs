//! Middleware layer.
//!
//! A middleware stage sees the request before the stages after it, decides
//! whether to continue by calling [`Next::run`], and sees the response on
//! the way back out. Stages are composed into a [`Chain`]:
//!
//! ```rust,no_run
//! use snippetbox::middleware::{Chain, Recover, RequestLogger, SecureHeaders};
//! # use snippetbox::Router;
//! # let router = Router::new();
//! let service = Chain::new()
//!     .with(Recover::new(false))
//!     .with(RequestLogger)
//!     .with(SecureHeaders)
//!     .then_boxed(router.into_handler());
//! ```
//!
//! Stages run strictly in the order they were added; there is no parallel
//! fan-out and no reordering.

mod auth;
mod csrf;
mod headers;
mod logging;
mod recover;

pub use auth::{AuthFact, Authenticate, RequireAuthentication, AUTH_USER_KEY, ORIGIN_URL_KEY};
pub use csrf::{CsrfContext, CsrfGuard};
pub use headers::SecureHeaders;
pub use logging::RequestLogger;
pub use recover::Recover;
pub(crate) use recover::{resume_panic, CatchPanic};

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// One stage of a middleware chain.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Handle `req`, calling `next.run(req)` to continue down the chain or
    /// returning a response directly to short-circuit it.
    async fn handle(&self, req: Request, next: Next) -> Response;
}

/// The remainder of a chain after the current stage.
pub struct Next {
    stages: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    /// Runs the remaining stages and finally the endpoint.
    pub async fn run(self, req: Request) -> Response {
        match self.stages.get(self.index).map(Arc::clone) {
            Some(stage) => {
                let next = Next {
                    stages: self.stages,
                    index: self.index + 1,
                    endpoint: self.endpoint,
                };
                stage.handle(req, next).await
            }
            None => self.endpoint.call(req).await,
        }
    }
}

/// An ordered list of middleware stages.
///
/// `Chain` is cheap to clone; [`Chain::append`] derives a longer chain from
/// a shared prefix, which is how the protected chain extends the dynamic
/// one.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `stage` as the innermost stage so far.
    pub fn with(mut self, stage: impl Middleware) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Returns a copy of this chain extended by `stage`; `self` is unchanged.
    pub fn append(&self, stage: impl Middleware) -> Self {
        self.clone().with(stage)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Closes the chain over a handler.
    pub fn then(&self, handler: impl Handler) -> BoxedHandler {
        self.then_boxed(handler.into_boxed_handler())
    }

    /// Closes the chain over an already boxed endpoint such as a router.
    pub fn then_boxed(&self, endpoint: BoxedHandler) -> BoxedHandler {
        Arc::new(Chained {
            stages: self.stages.clone().into(),
            endpoint,
        })
    }
}

struct Chained {
    stages: Arc<[Arc<dyn Middleware>]>,
    endpoint: BoxedHandler,
}

impl ErasedHandler for Chained {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Next {
            stages: Arc::clone(&self.stages),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        };
        Box::pin(next.run(req))
    }
}
