use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Logs one line per request before handing it on, so the request is on
/// record even if a later stage panics; status and latency follow at debug
/// level once the response is back.
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let remote = req.remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_owned());
        let method = req.method();
        let uri = req.uri().clone();
        info!(%remote, proto = ?req.version(), %method, %uri, "request");

        let started = Instant::now();
        let res = next.run(req).await;
        debug!(%method, %uri, status = res.status_code(), elapsed_ms = started.elapsed().as_millis() as u64, "response");
        res
    }
}
