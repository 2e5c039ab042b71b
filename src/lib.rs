//! # snippetbox
//!
//! A session-authenticated service for sharing text snippets, built around
//! a composable request pipeline.
//!
//! ## The pipeline
//!
//! Every request passes through the outer chain, then the router, then
//! (for application pages) the dynamic chain:
//!
//! - [`middleware::Recover`] turns a panic anywhere below it into a `500`
//! - [`middleware::RequestLogger`] and [`middleware::SecureHeaders`]
//! - [`session::SessionManager`] loads the session and saves it afterwards
//! - [`middleware::CsrfGuard`] rejects forged state-changing requests
//! - [`middleware::Authenticate`] resolves who is asking
//! - [`middleware::RequireAuthentication`] guards the protected routes
//!
//! Templates, SQL and TLS stay outside. The pipeline talks to them through
//! the [`models::Users`], [`models::Snippets`], [`session::SessionStore`]
//! and [`render::Renderer`] traits, which ship with in-memory
//! implementations.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use snippetbox::app::App;
//! use snippetbox::config::Config;
//! use snippetbox::models::{MemorySnippets, MemoryUsers};
//! use snippetbox::render::JsonRenderer;
//! use snippetbox::session::MemoryStore;
//! use snippetbox::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snippetbox::Error> {
//!     let config = Config::default();
//!     let addr = config.addr;
//!     let app = App::new(
//!         config,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryUsers::new()),
//!         Arc::new(MemorySnippets::new()),
//!         Arc::new(JsonRenderer),
//!     );
//!     Server::bind(addr).serve(app.routes()).await
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod static_files;
mod status;

pub mod app;
pub mod config;
pub mod fault;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod render;
pub mod session;
pub mod validator;

pub use error::{AppError, Error};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use method::Method;
pub use request::{FormError, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{serve_listener, Server};
pub use static_files::serve_dir;
pub use status::Status;
