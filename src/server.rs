//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Stops accepting connections.
//! 2. Tells every open connection to finish its in-flight request and
//!    close, so idle keep-alive connections go away at once.
//! 3. Waits up to [`DRAIN_TIMEOUT`] for that, then aborts whatever is left.
//! 4. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::fault;
use crate::handler::{BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::status::Status;

/// Largest request body the server buffers; bigger ones get `413`.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// How long in-flight requests get to finish after a shutdown signal.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Binds, then dispatches every request through `service` until a
    /// shutdown signal arrives and all in-flight requests have finished.
    pub async fn serve(self, service: BoxedHandler) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, service, shutdown_signal()).await
    }
}

/// Runs the accept loop on an already bound listener until `shutdown`
/// resolves, then drains open connections.
pub async fn serve_listener(
    listener: TcpListener,
    service: BoxedHandler,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    info!(addr = %listener.local_addr()?, "snippetbox listening");

    let builder = ConnBuilder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Shutdown wins over queued connections.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let service = Arc::clone(&service);
                // Called once per request on the connection.
                let svc = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    async move { dispatch(service, req, remote_addr).await }
                });
                let conn = builder.serve_connection(TokioIo::new(stream), svc).into_owned();
                let conn = graceful.watch(conn);

                tasks.spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(peer = %remote_addr, "connection closed: {e}");
                    }
                });
            }

            // Reap finished tasks so the set does not grow without bound.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(remaining = tasks.len(), "drain timed out, aborting open connections");
        tasks.shutdown().await;
    }

    info!("snippetbox stopped");
    Ok(())
}

/// Buffers one request, runs it through the service and hands the
/// response back to hyper. Every failure is answered with a status code.
async fn dispatch(
    service: BoxedHandler,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(status) => {
            debug!(peer = %remote_addr, status = u16::from(status), "rejected request body");
            return Ok(fault::client_error(status).into_inner());
        }
    };

    let response = match Request::from_http(http::Request::from_parts(parts, body), Some(remote_addr)) {
        Ok(req) => service.call(req).await,
        Err(e) => {
            debug!(peer = %remote_addr, "{e}");
            fault::client_error(Status::MethodNotAllowed)
        }
    };
    Ok(response.into_inner())
}

/// Buffers at most `limit` bytes of `body`.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Status>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(Status::PayloadTooLarge),
        Err(e) => {
            debug!("failed to read request body: {e}");
            Err(Status::BadRequest)
        }
    }
}

/// Resolves on the first SIGTERM or Ctrl-C. A signal that cannot be
/// listened for is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bodies_over_the_limit_are_refused() {
        let form = Full::new(Bytes::from_static(b"title=O+snail&content=Climb+Mount+Fuji&expires=7"));
        assert_eq!(read_body(form, 16).await, Err(Status::PayloadTooLarge));
    }

    #[tokio::test]
    async fn bodies_within_the_limit_are_buffered_whole() {
        let form = Full::new(Bytes::from_static(b"title=O+snail"));
        assert_eq!(read_body(form, MAX_BODY_BYTES).await, Ok(Bytes::from_static(b"title=O+snail")));
    }
}
