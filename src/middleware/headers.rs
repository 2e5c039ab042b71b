use async_trait::async_trait;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const POLICY: [(&str, &str); 5] = [
    (
        "content-security-policy",
        "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
    ),
    ("referrer-policy", "origin-when-cross-origin"),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "deny"),
    ("x-xss-protection", "0"),
];

/// Writes the security header policy onto `res`, replacing any values the
/// inner stages set.
pub(crate) fn apply(res: &mut Response) {
    for (name, value) in POLICY {
        res.set_header(name, value);
    }
}

/// Stamps the security header policy on every response.
///
/// A response built by [`Recover`](super::Recover) after a panic never
/// comes back through this stage, so `Recover` applies the same policy.
pub struct SecureHeaders;

#[async_trait]
impl Middleware for SecureHeaders {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let mut res = next.run(req).await;
        apply(&mut res);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ErasedHandler;
    use crate::middleware::Chain;
    use bytes::Bytes;

    #[tokio::test]
    async fn sets_policy_headers_and_keeps_the_body() {
        let req = http::Request::builder().uri("/").body(Bytes::new()).expect("valid request");
        let req = Request::from_http(req, None).expect("known method");

        let res = Chain::new()
            .with(SecureHeaders)
            .then(|_req: Request| async { "OK" })
            .call(req)
            .await;

        assert_eq!(
            res.header("Content-Security-Policy"),
            Some("default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com"),
        );
        assert_eq!(res.header("Referrer-Policy"), Some("origin-when-cross-origin"));
        assert_eq!(res.header("X-Content-Type-Options"), Some("nosniff"));
        assert_eq!(res.header("X-Frame-Options"), Some("deny"));
        assert_eq!(res.header("X-XSS-Protection"), Some("0"));
        assert_eq!(res.body(), b"OK");
    }
}
