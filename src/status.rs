//! HTTP status codes the pipeline produces, as a typed enum.
//!
//! ```rust
//! use snippetbox::{Response, Status};
//!
//! Response::status(Status::NotFound);
//! Response::builder().status(Status::UnprocessableContent).text("invalid");
//! ```

/// Status codes used by the handlers and middleware stages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,                   // 200
    SeeOther,             // 303
    BadRequest,           // 400
    NotFound,             // 404
    MethodNotAllowed,     // 405
    PayloadTooLarge,      // 413
    UnprocessableContent, // 422
    InternalServerError,  // 500
}

impl Status {
    /// The canonical reason phrase, used as the body of plain error responses.
    pub fn reason(self) -> &'static str {
        http::StatusCode::from_u16(self.into())
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("")
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::SeeOther             => 303,
            Status::BadRequest           => 400,
            Status::NotFound             => 404,
            Status::MethodNotAllowed     => 405,
            Status::PayloadTooLarge      => 413,
            Status::UnprocessableContent => 422,
            Status::InternalServerError  => 500,
        }
    }
}
