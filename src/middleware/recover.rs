//! Panic isolation for a single request.
//!
//! The chain below this stage is polled inside `catch_unwind`. While a
//! request is being polled the process panic hook is "armed" on that
//! thread: instead of printing to stderr it stashes the panic message and a
//! backtrace captured at the panic site, which this stage then logs.
//! Panics on threads that are not polling a request fall through to the
//! previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tracing::error;

use super::{headers, Middleware, Next};
use crate::fault;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<Panic>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// A caught panic: its message and the trace from where it was raised.
#[derive(Debug)]
pub(crate) struct Panic {
    pub message: String,
    pub trace: String,
}

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if ARMED.with(Cell::get) {
                let caught = Panic {
                    message: info.to_string(),
                    trace: Backtrace::force_capture().to_string(),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(caught));
            } else {
                previous(info);
            }
        }));
    });
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    payload.downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Future adapter that turns a panic while polling `inner` into `Err`.
pub(crate) struct CatchPanic {
    inner: BoxFuture,
}

impl CatchPanic {
    pub(crate) fn new(inner: BoxFuture) -> Self {
        install_hook();
        Self { inner }
    }
}

impl Future for CatchPanic {
    type Output = Result<Response, Panic>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.get_mut().inner;
        let was_armed = ARMED.with(|armed| armed.replace(true));
        let polled = panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx)));
        ARMED.with(|armed| armed.set(was_armed));

        match polled {
            Ok(poll) => poll.map(Ok),
            Err(payload) => {
                let caught = match payload.downcast::<Panic>() {
                    Ok(resumed) => *resumed,
                    Err(payload) => LAST_PANIC.with(|slot| slot.borrow_mut().take())
                        .unwrap_or_else(|| Panic {
                            message: payload_message(payload.as_ref()),
                            trace: String::from("<no backtrace captured>"),
                        }),
                };
                Poll::Ready(Err(caught))
            }
        }
    }
}

/// Continues unwinding a panic that an inner stage caught with
/// [`CatchPanic`] to run its own cleanup. An enclosing `CatchPanic` gets the
/// original message and trace back.
pub(crate) fn resume_panic(caught: Panic) -> ! {
    panic::resume_unwind(Box::new(caught))
}

/// Outermost stage: a panic anywhere below it becomes a logged `500` with
/// `Connection: close`, and never takes down the process or other requests.
///
/// With `debug` set the body carries the panic message and trace; otherwise
/// it is the generic status text.
pub struct Recover {
    debug: bool,
}

impl Recover {
    pub fn new(debug: bool) -> Self {
        install_hook();
        Self { debug }
    }
}

#[async_trait]
impl Middleware for Recover {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let method = req.method();
        let uri = req.uri().clone();

        match CatchPanic::new(Box::pin(next.run(req))).await {
            Ok(res) => res,
            Err(caught) => {
                error!(%method, %uri, panic = %caught.message, "request panicked\n{}", caught.trace);
                let detail = format!("{}\n{}", caught.message, caught.trace);
                let mut res = fault::internal_error(&detail, self.debug);
                headers::apply(&mut res);
                // Connection state is unknown after a panic mid-request.
                res.set_header("connection", "close");
                res
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ErasedHandler;
    use crate::middleware::{Chain, RequestLogger, SecureHeaders};
    use crate::status::Status;
    use bytes::Bytes;

    fn get() -> Request {
        let req = http::Request::builder().uri("/boom").body(Bytes::new()).expect("valid request");
        Request::from_http(req, None).expect("known method")
    }

    async fn boom(_req: Request) -> Response {
        panic!("snippet table exploded");
    }

    #[tokio::test]
    async fn panics_become_generic_500_with_connection_close() {
        let service = Chain::new().with(Recover::new(false)).then(boom);
        let res = service.call(get()).await;

        assert_eq!(res.status_code(), u16::from(Status::InternalServerError));
        assert_eq!(res.header("connection"), Some("close"));
        assert_eq!(res.body(), b"Internal Server Error");
    }

    #[tokio::test]
    async fn debug_mode_writes_only_the_trace_body() {
        let service = Chain::new().with(Recover::new(true)).then(boom);
        let res = service.call(get()).await;
        let body = String::from_utf8_lossy(res.body());

        assert_eq!(res.status_code(), 500);
        assert!(body.contains("snippet table exploded"));
        assert!(!body.ends_with("Internal Server Error"));
    }

    #[tokio::test]
    async fn panic_500_keeps_the_security_policy() {
        let service = Chain::new()
            .with(Recover::new(false))
            .with(RequestLogger)
            .with(SecureHeaders)
            .then(boom);
        let res = service.call(get()).await;

        assert_eq!(res.status_code(), 500);
        assert_eq!(res.header("x-frame-options"), Some("deny"));
        assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
        assert!(res.header("content-security-policy").is_some_and(|csp| csp.starts_with("default-src 'self'")));
    }

    #[tokio::test]
    async fn resumed_panics_keep_their_message() {
        async fn rethrow(req: Request) -> Response {
            match CatchPanic::new(Box::pin(boom(req))).await {
                Ok(res) => res,
                Err(caught) => resume_panic(caught),
            }
        }

        let service = Chain::new().with(Recover::new(true)).then(rethrow);
        let res = service.call(get()).await;
        let body = String::from_utf8_lossy(res.body());

        assert_eq!(res.status_code(), 500);
        assert!(body.contains("snippet table exploded"));
        assert!(!body.contains("<no backtrace captured>"));
    }

    #[tokio::test]
    async fn later_requests_are_unaffected() {
        let service = Chain::new().with(Recover::new(false)).then(boom);
        let _ = service.call(get()).await;

        let healthy = Chain::new().with(Recover::new(false)).then(|_req: Request| async { "OK" });
        let res = healthy.call(get()).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.header("connection"), None);
    }
}
