//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Anything that does not
//! match, including a known path under the wrong method, goes to the
//! router's not-found handler so every miss is answered the same way.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::fault;

/// The application router.
///
/// Build it once at startup, wrap it in the outer middleware chain and pass
/// the result to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            not_found: default_not_found.into_boxed_handler(),
        }
    }

    /// Register a plain handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax, catch-alls `{*name}`:
    ///
    /// ```rust
    /// # use snippetbox::{Method, Request, Router};
    /// # async fn view(_: Request) -> &'static str { "" }
    /// # async fn asset(_: Request) -> &'static str { "" }
    /// Router::new()
    ///     .on(Method::Get, "/snippet/view/{id}", view)
    ///     .on(Method::Get, "/static/{*filepath}", asset);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing
    /// one. Routes are fixed at startup, so this is a programming error.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(method, path, handler.into_boxed_handler())
    }

    /// Register an already boxed endpoint, typically a middleware chain
    /// closed over a handler with [`Chain::then`](crate::middleware::Chain::then).
    ///
    /// # Panics
    ///
    /// Same as [`Router::on`].
    pub fn route(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Replaces the responder used for unmatched paths and methods.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = handler.into_boxed_handler();
        self
    }

    /// Erases the router into the handler type the middleware chains and
    /// the server work with.
    pub fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }

    fn lookup(&self, method: Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl ErasedHandler for Router {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req)
            }
            None => self.not_found.call(req),
        }
    }
}

async fn default_not_found(_req: Request) -> Response {
    fault::not_found()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn get(path: &str) -> Request {
        let req = http::Request::builder().uri(path).body(Bytes::new()).expect("valid request");
        Request::from_http(req, None).expect("known method")
    }

    async fn echo_id(req: Request) -> String {
        req.param("id").unwrap_or_default().to_owned()
    }

    #[tokio::test]
    async fn extracts_path_parameters() {
        let router = Router::new().on(Method::Get, "/snippet/view/{id}", echo_id).into_handler();
        let res = router.call(get("/snippet/view/42")).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.body(), b"42");
    }

    #[tokio::test]
    async fn misses_use_the_custom_not_found() {
        let router = Router::new()
            .on(Method::Post, "/user/login", echo_id)
            .not_found(|_req: Request| async { "custom miss" })
            .into_handler();

        let wrong_method = router.call(get("/user/login")).await;
        assert_eq!(wrong_method.body(), b"custom miss");

        let unknown_path = router.call(get("/snippet/view/")).await;
        assert_eq!(unknown_path.body(), b"custom miss");
    }
}
