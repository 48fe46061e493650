//! Security response headers.
//!
//! Defaults:
//!
//! | Header | Value |
//! |---|---|
//! | `cross-origin-resource-policy` | `same-origin` |
//! | `cross-origin-opener-policy` | `same-origin` |
//! | `origin-agent-cluster` | `?1` |
//! | `referrer-policy` | `no-referrer` |
//! | `strict-transport-security` | `max-age=15552000; includeSubDomains` |
//! | `x-content-type-options` | `nosniff` |
//! | `x-dns-prefetch-control` | `off` |
//! | `x-download-options` | `noopen` |
//! | `x-frame-options` | `SAMEORIGIN` |
//! | `x-permitted-cross-domain-policies` | `none` |
//! | `x-xss-protection` | `0` |
//!
//! Each can be dropped with [`SecureHeaders::disable`] or replaced with
//! [`SecureHeaders::set`], which also adds headers not in the table (e.g.
//! `content-security-policy`). A header the handler already set is left alone.

use crate::context::Context;
use crate::pipeline::{BoxFuture, Middleware, Next};
use crate::response::Outcome;

const DEFAULTS: &[(&str, &str)] = &[
    ("cross-origin-resource-policy", "same-origin"),
    ("cross-origin-opener-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

#[derive(Clone, Debug)]
pub struct SecureHeaders {
    headers: Vec<(String, String)>,
}

pub fn secure_headers() -> SecureHeaders {
    SecureHeaders {
        headers: DEFAULTS.iter().map(|&(name, value)| (name.to_owned(), value.to_owned())).collect(),
    }
}

impl SecureHeaders {
    pub fn disable(mut self, name: &str) -> Self {
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self
    }

    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.headers.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_ascii_lowercase(), value)),
        }
        self
    }
}

impl Middleware for SecureHeaders {
    fn name(&self) -> &'static str {
        "secureHeaders"
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let mut response = next.run(ctx).await?;
            for (name, value) in &self.headers {
                if !response.has_header(name) {
                    response.set_header(name, value.as_str());
                }
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::middleware::testing::{Ok200, run};
    use crate::pipeline::Endpoint;
    use crate::request::Request;
    use crate::response::Response;

    fn get() -> Request {
        Request::new(Method::Get, "/")
    }

    #[tokio::test]
    async fn defaults_are_applied() {
        let response = run(secure_headers(), get(), Ok200).await.unwrap();
        for (name, value) in DEFAULTS {
            assert_eq!(response.header(name), Some(*value), "{name}");
        }
    }

    #[tokio::test]
    async fn headers_can_be_disabled_or_overridden() {
        let middleware = secure_headers()
            .disable("X-Frame-Options")
            .set("referrer-policy", "same-origin")
            .set("Content-Security-Policy", "default-src 'self'");
        let response = run(middleware, get(), Ok200).await.unwrap();

        assert!(!response.has_header("x-frame-options"));
        assert_eq!(response.header("referrer-policy"), Some("same-origin"));
        assert_eq!(response.header("content-security-policy"), Some("default-src 'self'"));
    }

    struct Framed;

    impl Endpoint for Framed {
        fn call<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
            Box::pin(async { Ok(Response::new(200).with_header("X-Frame-Options", "DENY")) })
        }
    }

    #[tokio::test]
    async fn handler_headers_win() {
        let response = run(secure_headers(), get(), Framed).await.unwrap();
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
    }
}
