#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use cookie::Cookie;
use serde_json::Value as Json;

use snippetbox::app::App;
use snippetbox::config::Config;
use snippetbox::models::{MemorySnippets, MemoryUsers, Snippets, Users};
use snippetbox::render::JsonRenderer;
use snippetbox::session::MemoryStore;
use snippetbox::{BoxedHandler, ErasedHandler, Request, Response};

pub const ALICE_EMAIL: &str = "alice@example.com";
pub const ALICE_PASSWORD: &str = "pa$$word";

/// Drives the fully composed service in-process, carrying cookies between
/// requests the way a browser would.
pub struct TestClient {
    service: BoxedHandler,
    jar: HashMap<String, String>,
}

impl TestClient {
    pub fn new(service: BoxedHandler) -> Self {
        Self { service, jar: HashMap::new() }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.jar.get(name).map(String::as_str)
    }

    pub async fn get(&mut self, path: &str) -> Response {
        self.send("GET", path, Vec::new(), Bytes::new()).await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> Response {
        let body = serde_urlencoded::to_string(fields).expect("encodable form");
        let headers = vec![("content-type", "application/x-www-form-urlencoded".to_owned())];
        self.send("POST", path, headers, Bytes::from(body)).await
    }

    pub async fn send(
        &mut self,
        method: &str,
        path: &str,
        headers: Vec<(&str, String)>,
        body: Bytes,
    ) -> Response {
        let mut builder = http::Request::builder().method(method).uri(path);
        if !self.jar.is_empty() {
            let cookies = self.jar.iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header("cookie", cookies);
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let req = builder.body(body).expect("valid request");
        let req = Request::from_http(req, Some("127.0.0.1:50000".parse().expect("addr")))
            .expect("known method");

        let res = self.service.call(req).await;
        for raw in res.header_values("set-cookie") {
            let cookie = Cookie::parse(raw.to_owned()).expect("valid set-cookie");
            if cookie.max_age() == Some(time::Duration::ZERO) {
                self.jar.remove(cookie.name());
            } else {
                self.jar.insert(cookie.name().to_owned(), cookie.value().to_owned());
            }
        }
        res
    }

    /// The CSRF token embedded in the page at `path`.
    pub async fn csrf_token(&mut self, path: &str) -> String {
        let res = self.get(path).await;
        assert_eq!(res.status_code(), 200, "GET {path} for a csrf token");
        json(&res)["data"]["csrf_token"]
            .as_str()
            .expect("page carries a csrf token")
            .to_owned()
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Response {
        let token = self.csrf_token("/user/login").await;
        self.post_form("/user/login", &[("email", email), ("password", password), ("csrf_token", &token)])
            .await
    }
}

pub fn json(res: &Response) -> Json {
    serde_json::from_slice(res.body()).expect("json body")
}

/// A running pipeline over seeded in-memory collaborators.
pub struct TestApp {
    pub client: TestClient,
    pub store: MemoryStore,
    pub users: MemoryUsers,
    pub snippets: MemorySnippets,
    pub alice: i64,
    pub pond: i64,
}

pub async fn spawn() -> TestApp {
    spawn_with(Config::default()).await
}

pub async fn spawn_with(mut config: Config) -> TestApp {
    config.secret = Some("integration-test-secret".parse().expect("infallible"));

    let store = MemoryStore::new();
    let users = MemoryUsers::with_params(argon2::Params::new(8, 1, 1, None).expect("params"));
    let snippets = MemorySnippets::new();

    let alice = users.insert("Alice", ALICE_EMAIL, ALICE_PASSWORD).await.expect("seed alice");
    users.insert("Dupe", "dupe@example.com", ALICE_PASSWORD).await.expect("seed dupe");
    let pond = snippets
        .insert("An old silent pond", "An old silent pond...\nA frog jumps into the pond,\nsplash! Silence again.", 365)
        .await
        .expect("seed snippet");

    let app = App::new(
        config,
        Arc::new(store.clone()),
        Arc::new(users.clone()),
        Arc::new(snippets.clone()),
        Arc::new(JsonRenderer),
    );

    TestApp { client: TestClient::new(app.routes()), store, users, snippets, alice, pond }
}
