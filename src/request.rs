//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::Error;
use crate::method::Method;

/// The submitted form body could not be decoded into the target form.
#[derive(Debug, Error)]
#[error("malformed form body: {0}")]
pub struct FormError(#[from] serde_urlencoded::de::Error);

/// An incoming HTTP request with its body fully buffered.
///
/// Middleware stages attach request-scoped context (the session handle,
/// the CSRF context, the authentication fact) as typed extensions; the
/// accessors for those live next to the stage that produces them.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: http::Uri,
    pub(crate) version: http::Version,
    pub(crate) headers: http::HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) extensions: http::Extensions,
}

impl Request {
    /// Builds a request from its buffered `http` form.
    ///
    /// Fails with [`Error::UnknownMethod`] for method tokens outside
    /// [`Method`].
    pub fn from_http(req: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> Result<Self, Error> {
        let (parts, body) = req.into_parts();
        let method = parts.method.as_str()
            .parse()
            .map_err(|()| Error::UnknownMethod(parts.method.to_string()))?;
        Ok(Self {
            method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr,
            extensions: parts.extensions,
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn uri(&self) -> &http::Uri { &self.uri }
    pub fn version(&self) -> http::Version { self.version }
    pub fn headers(&self) -> &http::HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    pub fn extensions(&self) -> &http::Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut http::Extensions { &mut self.extensions }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/snippet/view/{id}`, `req.param("id")` on
    /// `/snippet/view/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Value of the request cookie `name`, if sent.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers.get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(cookie::Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
    }

    /// Decodes an `application/x-www-form-urlencoded` body into `T`.
    ///
    /// Fields not declared on `T` (such as `csrf_token`) are ignored.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, FormError> {
        Ok(serde_urlencoded::from_bytes(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn request(method: &str, uri: &str, body: &'static str) -> http::Request<Bytes> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("cookie", "theme=dark; session=abc123")
            .body(Bytes::from_static(body.as_bytes()))
            .expect("valid request")
    }

    #[test]
    fn rejects_unknown_methods() {
        let err = Request::from_http(request("BREW", "/", ""), None).err();
        assert!(matches!(err, Some(Error::UnknownMethod(m)) if m == "BREW"));
    }

    #[test]
    fn reads_cookies_by_name() {
        let req = Request::from_http(request("GET", "/", ""), None).expect("known method");
        assert_eq!(req.cookie("session").as_deref(), Some("abc123"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[derive(Deserialize)]
    struct Expiry {
        expires: i64,
    }

    #[test]
    fn decodes_forms_and_reports_bad_values() {
        let ok = Request::from_http(request("POST", "/", "expires=7&csrf_token=x"), None)
            .expect("known method");
        assert_eq!(ok.form::<Expiry>().expect("decodes").expires, 7);

        let bad = Request::from_http(request("POST", "/", "expires=soon"), None)
            .expect("known method");
        assert!(bad.form::<Expiry>().is_err());
    }
}
