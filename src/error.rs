//! Unified error types.

use thiserror::Error;

use crate::models::ModelError;
use crate::render::RenderError;
use crate::session::StoreError;

/// Infrastructure failures outside any single request: binding a port,
/// accepting a connection, or receiving a request the pipeline cannot
/// represent.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported method `{0}`")]
    UnknownMethod(String),
}

/// A fault raised while handling one request.
///
/// Every variant is answered with `500 Internal Server Error`; expected
/// client conditions (bad forms, failed logins, CSRF) are responses, not
/// `AppError`s.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("session store: {0}")]
    Store(#[from] StoreError),

    #[error("model: {0}")]
    Model(#[from] ModelError),

    #[error("render: {0}")]
    Render(#[from] RenderError),

    #[error("request is missing {0}; route is not wrapped in the dynamic chain")]
    MissingContext(&'static str),
}
