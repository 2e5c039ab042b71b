//! Error responders shared by handlers and middleware stages.
//!
//! Every failure leaves the process through one of these, so the client
//! always sees the same plain-text shape and server faults are always
//! logged with a trace.

use std::backtrace::Backtrace;
use std::error::Error as StdError;

use tracing::error;

use crate::response::Response;
use crate::status::Status;

/// Logs `err` with a backtrace and answers `500`.
///
/// The body is the generic status text, or the error and trace when `debug`
/// is set. Exactly one body is written either way.
pub fn server_error(err: &(dyn StdError + 'static), debug: bool) -> Response {
    let detail = format!("{err}\n{}", Backtrace::force_capture());
    error!("{detail}");
    internal_error(&detail, debug)
}

/// Builds the `500` response for an already logged fault.
pub(crate) fn internal_error(detail: &str, debug: bool) -> Response {
    let body = if debug { detail } else { Status::InternalServerError.reason() };
    Response::builder()
        .status(Status::InternalServerError)
        .text(body)
}

/// Plain `status` response whose body is the reason phrase.
pub fn client_error(status: Status) -> Response {
    Response::builder().status(status).text(status.reason())
}

/// `404 Not Found`, used by the router and by handlers for missing records.
pub fn not_found() -> Response {
    client_error(Status::NotFound)
}
