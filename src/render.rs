//! Page rendering.
//!
//! Handlers fill a [`TemplateData`] and name a page; a [`Renderer`] turns
//! the pair into bytes. The core never formats HTML itself. The bundled
//! [`JsonRenderer`] emits the page name and data as JSON, which keeps the
//! binary runnable without a template set and makes responses easy to
//! assert on in tests.

use chrono::{Datelike, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::forms::{LoginForm, PasswordUpdateForm, SignupForm, SnippetCreateForm};
use crate::models::{Snippet, User};
use crate::response::ContentType;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("the template {0} does not exist")]
    UnknownPage(String),

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The form shown on a page, echoed back with its errors after a failed
/// submission.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Form {
    SnippetCreate(SnippetCreateForm),
    Signup(SignupForm),
    Login(LoginForm),
    PasswordUpdate(PasswordUpdateForm),
}

impl From<SnippetCreateForm> for Form {
    fn from(form: SnippetCreateForm) -> Self { Self::SnippetCreate(form) }
}

impl From<SignupForm> for Form {
    fn from(form: SignupForm) -> Self { Self::Signup(form) }
}

impl From<LoginForm> for Form {
    fn from(form: LoginForm) -> Self { Self::Login(form) }
}

impl From<PasswordUpdateForm> for Form {
    fn from(form: PasswordUpdateForm) -> Self { Self::PasswordUpdate(form) }
}

/// Everything a page may display.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: Option<Form>,
    pub user: Option<User>,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: Option<String>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self { current_year: Utc::now().year(), ..Self::default() }
    }

    pub fn with_form(mut self, form: impl Into<Form>) -> Self {
        self.form = Some(form.into());
        self
    }
}

/// Turns a page name and its data into a response body.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, page: &str, data: &TemplateData) -> Result<Vec<u8>, RenderError>;

    fn content_type(&self) -> ContentType;
}

/// Page names the application renders.
pub const PAGES: &[&str] = &[
    "home.html",
    "view.html",
    "create.html",
    "signup.html",
    "login.html",
    "about.html",
    "account.html",
    "password_update.html",
];

/// Renders `{"page": …, "data": …}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

#[derive(Serialize)]
struct Envelope<'a> {
    page: &'a str,
    data: &'a TemplateData,
}

impl Renderer for JsonRenderer {
    fn render(&self, page: &str, data: &TemplateData) -> Result<Vec<u8>, RenderError> {
        if !PAGES.contains(&page) {
            return Err(RenderError::UnknownPage(page.to_owned()));
        }
        Ok(serde_json::to_vec(&Envelope { page, data })?)
    }

    fn content_type(&self) -> ContentType {
        ContentType::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pages_are_errors() {
        let err = JsonRenderer.render("missing.html", &TemplateData::new()).unwrap_err();
        assert_eq!(err.to_string(), "the template missing.html does not exist");
    }

    #[test]
    fn envelope_carries_page_and_data() {
        let mut data = TemplateData::new().with_form(SnippetCreateForm::default());
        data.flash = Some("Snippet successfully created!".into());
        data.is_authenticated = true;

        let body = JsonRenderer.render("create.html", &data).expect("render");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");

        assert_eq!(json["page"], "create.html");
        assert_eq!(json["data"]["form"]["expires"], 365);
        assert_eq!(json["data"]["flash"], "Snippet successfully created!");
        assert_eq!(json["data"]["is_authenticated"], true);
        assert!(json["data"]["current_year"].as_i64().is_some_and(|y| y >= 2024));
    }
}
