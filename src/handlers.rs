//! Route handlers.
//!
//! Every handler takes the shared [`App`] and the request, and either
//! returns a response or an [`AppError`] that becomes a `500`. Expected
//! failures (bad input, wrong password, missing snippet) are responses.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::app::{App, FLASH_KEY, LOGIN_PATH};
use crate::error::AppError;
use crate::fault;
use crate::forms::{LoginForm, PasswordUpdateForm, SignupForm, SnippetCreateForm};
use crate::middleware::{AUTH_USER_KEY, ORIGIN_URL_KEY};
use crate::models::ModelError;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Where a successful login goes when no protected page was requested first.
const DEFAULT_LOGIN_REDIRECT: &str = "/snippet/create";

/// Decodes the form body, or `None` when it is malformed.
fn decode<T: DeserializeOwned>(req: &Request) -> Option<T> {
    match req.form() {
        Ok(form) => Some(form),
        Err(e) => {
            debug!(path = req.path(), "{e}");
            None
        }
    }
}

fn bad_request() -> Response {
    fault::client_error(Status::BadRequest)
}

/// Liveness probe.
pub async fn ping(_req: Request) -> &'static str {
    "OK"
}

pub async fn home(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let snippets = app.snippets.latest().await?;
    let mut data = app.template_data(&req);
    data.snippets = snippets;
    app.render(Status::Ok, "home.html", &data)
}

pub async fn snippet_view(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let id = req.param("id")
        .and_then(|id| id.parse::<i64>().ok())
        .filter(|id| *id > 0);
    let Some(id) = id else {
        return Ok(fault::not_found());
    };

    let snippet = match app.snippets.get(id).await {
        Ok(snippet) => snippet,
        Err(ModelError::NoRecord) => return Ok(fault::not_found()),
        Err(e) => return Err(e.into()),
    };
    let mut data = app.template_data(&req);
    data.snippet = Some(snippet);
    app.render(Status::Ok, "view.html", &data)
}

pub async fn snippet_create(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let data = app.template_data(&req).with_form(SnippetCreateForm::default());
    app.render(Status::Ok, "create.html", &data)
}

pub async fn snippet_create_post(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let Some(mut form) = decode::<SnippetCreateForm>(&req) else {
        return Ok(bad_request());
    };
    if !form.validate() {
        let data = app.template_data(&req).with_form(form);
        return app.render(Status::UnprocessableContent, "create.html", &data);
    }

    let id = app.snippets.insert(&form.title, &form.content, form.expires).await?;
    app.session(&req)?.put(FLASH_KEY, "Snippet successfully created!");
    Ok(Response::redirect(&format!("/snippet/view/{id}")))
}

pub async fn user_signup(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let data = app.template_data(&req).with_form(SignupForm::default());
    app.render(Status::Ok, "signup.html", &data)
}

pub async fn user_signup_post(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let Some(mut form) = decode::<SignupForm>(&req) else {
        return Ok(bad_request());
    };
    if !form.validate() {
        let data = app.template_data(&req).with_form(form);
        return app.render(Status::UnprocessableContent, "signup.html", &data);
    }

    match app.users.insert(&form.name, &form.email, &form.password).await {
        Ok(id) => info!(user_id = id, "user signed up"),
        Err(ModelError::DuplicateEmail) => {
            form.validator.add_field_error("email", "Email address is already in use");
            let data = app.template_data(&req).with_form(form);
            return app.render(Status::UnprocessableContent, "signup.html", &data);
        }
        Err(e) => return Err(e.into()),
    }

    app.session(&req)?.put(FLASH_KEY, "Your signup was successful. Please log in.");
    Ok(Response::redirect(LOGIN_PATH))
}

pub async fn user_login(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let data = app.template_data(&req).with_form(LoginForm::default());
    app.render(Status::Ok, "login.html", &data)
}

pub async fn user_login_post(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let Some(mut form) = decode::<LoginForm>(&req) else {
        return Ok(bad_request());
    };
    if !form.validate() {
        let data = app.template_data(&req).with_form(form);
        return app.render(Status::UnprocessableContent, "login.html", &data);
    }

    let id = match app.users.authenticate(&form.email, &form.password).await {
        Ok(id) => id,
        Err(ModelError::InvalidCredentials) => {
            form.validator.add_non_field_error("Email or password is incorrect");
            let data = app.template_data(&req).with_form(form);
            return app.render(Status::UnprocessableContent, "login.html", &data);
        }
        Err(e) => return Err(e.into()),
    };

    let session = app.session(&req)?;
    session.renew_token().await?;
    session.put(AUTH_USER_KEY, id);
    info!(user_id = id, "user logged in");

    // Only same-site paths are ever stored, but never bounce off-site.
    let target = session.pop_string(ORIGIN_URL_KEY)
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| DEFAULT_LOGIN_REDIRECT.to_owned());
    Ok(Response::redirect(&target))
}

pub async fn user_logout_post(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let session = app.session(&req)?;
    session.renew_token().await?;
    session.remove(AUTH_USER_KEY);
    session.put(FLASH_KEY, "You've been logged out successfully!");
    info!(user_id = ?req.auth().user_id(), "user logged out");
    Ok(Response::redirect("/"))
}

pub async fn about(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let data = app.template_data(&req);
    app.render(Status::Ok, "about.html", &data)
}

pub async fn account(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let Some(id) = req.auth().user_id() else {
        return Ok(Response::redirect(LOGIN_PATH));
    };
    let user = match app.users.get(id).await {
        Ok(user) => user,
        Err(ModelError::NoRecord) => return Ok(Response::redirect(LOGIN_PATH)),
        Err(e) => return Err(e.into()),
    };
    let mut data = app.template_data(&req);
    data.user = Some(user);
    app.render(Status::Ok, "account.html", &data)
}

pub async fn account_password_update(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let data = app.template_data(&req).with_form(PasswordUpdateForm::default());
    app.render(Status::Ok, "password_update.html", &data)
}

pub async fn account_password_update_post(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let Some(mut form) = decode::<PasswordUpdateForm>(&req) else {
        return Ok(bad_request());
    };
    if !form.validate() {
        let data = app.template_data(&req).with_form(form);
        return app.render(Status::UnprocessableContent, "password_update.html", &data);
    }
    let Some(id) = req.auth().user_id() else {
        return Ok(Response::redirect(LOGIN_PATH));
    };

    match app.users.password_update(id, &form.current_password, &form.new_password).await {
        Ok(()) => info!(user_id = id, "password updated"),
        Err(ModelError::InvalidCredentials) => {
            form.validator.add_field_error("current_password", "Current password is incorrect");
            let data = app.template_data(&req).with_form(form);
            return app.render(Status::UnprocessableContent, "password_update.html", &data);
        }
        Err(e) => return Err(e.into()),
    }

    app.session(&req)?.put(FLASH_KEY, "Your password has been updated!");
    Ok(Response::redirect("/user/account"))
}
