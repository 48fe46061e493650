//! Cross-origin resource sharing.
//!
//! # Origin resolution
//!
//! | Configured | Request `Origin` | `access-control-allow-origin` | `vary: Origin` |
//! |---|---|---|---|
//! | any (default), no credentials | any | `*` | no |
//! | any, credentials | present | the request origin | yes |
//! | exact string | any | that string | no |
//! | list | in the list | the request origin | yes |
//! | list | absent or not listed | *(no CORS headers)* | |
//! | function | passed to the function | its `Some` result, nothing for `None` | yes |
//!
//! A preflight is an `OPTIONS` request carrying
//! `access-control-request-method`. It is answered here with `204` and never
//! reaches the handler. An `OPTIONS` request without that header is passed
//! through untouched. When no origin resolves, CORS stays out of the way
//! entirely and the request continues down the pipeline.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::method::Method;
use crate::pipeline::{BoxFuture, Middleware, Next};
use crate::response::{Outcome, Response};

const ALLOW_ORIGIN: &str = "access-control-allow-origin";
const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
const ALLOW_METHODS: &str = "access-control-allow-methods";
const ALLOW_HEADERS: &str = "access-control-allow-headers";
const EXPOSE_HEADERS: &str = "access-control-expose-headers";
const MAX_AGE: &str = "access-control-max-age";
const REQUEST_METHOD: &str = "access-control-request-method";
const REQUEST_HEADERS: &str = "access-control-request-headers";

const DEFAULT_METHODS: &[&str] = &["GET", "HEAD", "PUT", "POST", "DELETE", "PATCH"];

type OriginFn = Arc<dyn Fn(Option<&str>, &Context) -> Option<String> + Send + Sync>;

/// Which origins may read responses.
#[derive(Clone)]
pub enum AllowOrigin {
    Any,
    Exact(String),
    List(Vec<String>),
    Dynamic(OriginFn),
}

impl fmt::Debug for AllowOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Exact(origin) => f.debug_tuple("Exact").field(origin).finish(),
            Self::List(origins) => f.debug_tuple("List").field(origins).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// See the [module docs](self).
#[derive(Clone, Debug)]
pub struct Cors {
    origin: AllowOrigin,
    allow_methods: Vec<String>,
    allow_headers: Vec<String>,
    expose_headers: Vec<String>,
    max_age: Option<u64>,
    credentials: bool,
}

pub fn cors() -> Cors {
    Cors {
        origin: AllowOrigin::Any,
        allow_methods: DEFAULT_METHODS.iter().map(|&m| m.to_owned()).collect(),
        allow_headers: Vec::new(),
        expose_headers: Vec::new(),
        max_age: None,
        credentials: false,
    }
}

fn owned<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl Cors {
    /// A single allowed origin. `"*"` means any.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.origin = if origin == "*" { AllowOrigin::Any } else { AllowOrigin::Exact(origin) };
        self
    }

    pub fn origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origin = AllowOrigin::List(owned(origins));
        self
    }

    /// Decides per request. Receives the request's `Origin`, if any.
    pub fn origin_fn(
        mut self,
        resolve: impl Fn(Option<&str>, &Context) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.origin = AllowOrigin::Dynamic(Arc::new(resolve));
        self
    }

    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_methods = owned(methods);
        self
    }

    /// Headers a preflight may ask for. Left empty, the requested ones are reflected.
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_headers = owned(headers);
        self
    }

    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = owned(headers);
        self
    }

    /// Preflight cache lifetime in seconds.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    /// The allow-origin value and whether it depends on the request origin.
    fn resolve(&self, ctx: &Context) -> Option<(String, bool)> {
        let request_origin = ctx.request.header("origin");
        match &self.origin {
            AllowOrigin::Any => match request_origin {
                Some(origin) if self.credentials => Some((origin.to_owned(), true)),
                _ => Some(("*".to_owned(), false)),
            },
            AllowOrigin::Exact(origin) => Some((origin.clone(), false)),
            AllowOrigin::List(allowed) => request_origin
                .filter(|origin| allowed.iter().any(|a| a == origin))
                .map(|origin| (origin.to_owned(), true)),
            AllowOrigin::Dynamic(resolve) => resolve(request_origin, ctx).map(|origin| (origin, true)),
        }
    }

    fn stamp_origin(&self, response: &mut Response, origin: String, varies: bool) {
        response.set_header(ALLOW_ORIGIN, origin);
        if self.credentials {
            response.set_header(ALLOW_CREDENTIALS, "true");
        }
        if varies {
            add_vary(response, "Origin");
        }
    }

    fn preflight(&self, ctx: &Context, origin: String, varies: bool) -> Response {
        let mut response = Response::new(204);
        self.stamp_origin(&mut response, origin, varies);
        response.set_header(ALLOW_METHODS, self.allow_methods.join(","));

        if !self.allow_headers.is_empty() {
            response.set_header(ALLOW_HEADERS, self.allow_headers.join(","));
        } else if let Some(requested) = ctx.request.header(REQUEST_HEADERS) {
            response.set_header(ALLOW_HEADERS, requested);
            add_vary(&mut response, "Access-Control-Request-Headers");
        }

        if let Some(seconds) = self.max_age {
            response.set_header(MAX_AGE, seconds.to_string());
        }
        response
    }
}

/// Adds `token` to the `vary` header unless it is already listed.
fn add_vary(response: &mut Response, token: &str) {
    let merged = match response.header("vary") {
        Some(existing) if existing.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)) => return,
        Some(existing) => format!("{existing}, {token}"),
        None => token.to_owned(),
    };
    response.set_header("vary", merged);
}

fn is_preflight(ctx: &Context) -> bool {
    ctx.request.method == Method::Options && ctx.request.header(REQUEST_METHOD).is_some()
}

impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            // A bare OPTIONS is left to the application.
            if ctx.request.method == Method::Options && !is_preflight(ctx) {
                return next.run(ctx).await;
            }
            let Some((origin, varies)) = self.resolve(ctx) else {
                return next.run(ctx).await;
            };

            if is_preflight(ctx) {
                return Ok(self.preflight(ctx, origin, varies));
            }

            let mut response = next.run(ctx).await?;
            self.stamp_origin(&mut response, origin, varies);
            if !self.expose_headers.is_empty() {
                response.set_header(EXPOSE_HEADERS, self.expose_headers.join(","));
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::{Ok200, run};
    use crate::request::Request;

    fn get(origin: Option<&str>) -> Request {
        let req = Request::new(Method::Get, "/");
        match origin {
            Some(origin) => req.with_header("Origin", origin),
            None => req,
        }
    }

    fn preflight(origin: &str) -> Request {
        Request::new(Method::Options, "/items")
            .with_header("Origin", origin)
            .with_header("Access-Control-Request-Method", "PUT")
            .with_header("Access-Control-Request-Headers", "x-token, content-type")
    }

    #[tokio::test]
    async fn credentials_reflect_the_origin() {
        let response = run(cors().credentials(true), get(Some("https://x")), Ok200).await.unwrap();
        assert_eq!(response.header(ALLOW_ORIGIN), Some("https://x"));
        assert_eq!(response.header(ALLOW_CREDENTIALS), Some("true"));
        assert!(response.header("vary").unwrap().eq_ignore_ascii_case("origin"));
    }

    #[tokio::test]
    async fn default_is_wildcard_without_vary() {
        for origin in [None, Some("https://x")] {
            let response = run(cors(), get(origin), Ok200).await.unwrap();
            assert_eq!(response.header(ALLOW_ORIGIN), Some("*"));
            assert!(!response.has_header("vary"));
        }
    }

    #[tokio::test]
    async fn star_string_means_any() {
        let response = run(cors().origin("*"), get(Some("https://x")), Ok200).await.unwrap();
        assert_eq!(response.header(ALLOW_ORIGIN), Some("*"));
    }

    #[tokio::test]
    async fn exact_origin_is_literal() {
        let response = run(cors().origin("https://app"), get(Some("https://evil")), Ok200).await.unwrap();
        assert_eq!(response.header(ALLOW_ORIGIN), Some("https://app"));
    }

    #[tokio::test]
    async fn list_reflects_members_only() {
        let allowed = || cors().origins(["https://a", "https://b"]);

        let response = run(allowed(), get(Some("https://b")), Ok200).await.unwrap();
        assert_eq!(response.header(ALLOW_ORIGIN), Some("https://b"));

        let response = run(allowed(), get(Some("https://c")), Ok200).await.unwrap();
        assert!(!response.has_header(ALLOW_ORIGIN));
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn list_without_request_origin_adds_nothing() {
        let response = run(cors().origins(["https://a"]).expose_headers(["x-id"]), get(None), Ok200)
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert!(!response.has_header(ALLOW_ORIGIN));
        assert!(!response.has_header(EXPOSE_HEADERS));
        assert!(!response.has_header("vary"));
    }

    #[tokio::test]
    async fn function_returning_none_passes_through() {
        let middleware = cors().origin_fn(|origin, _ctx| origin.filter(|o| o.ends_with(".example.com")).map(str::to_owned));

        let response = run(middleware.clone(), get(Some("https://api.example.com")), Ok200).await.unwrap();
        assert_eq!(response.header(ALLOW_ORIGIN), Some("https://api.example.com"));

        let response = run(middleware.clone(), get(Some("https://other.org")), Ok200).await.unwrap();
        assert!(!response.has_header(ALLOW_ORIGIN));

        // Preflight with no resolved origin reaches the handler.
        let response = run(middleware, preflight("https://other.org"), Ok200).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(!response.has_header(ALLOW_METHODS));
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let response = run(cors().max_age(600), preflight("https://x"), Ok200).await.unwrap();
        assert_eq!(response.status_code, 204);
        assert_eq!(response.header(ALLOW_METHODS), Some("GET,HEAD,PUT,POST,DELETE,PATCH"));
        assert_eq!(response.header(ALLOW_HEADERS), Some("x-token, content-type"));
        assert_eq!(response.header(MAX_AGE), Some("600"));
        assert!(response.body.is_none());
    }

    #[tokio::test]
    async fn configured_headers_replace_reflection() {
        let middleware = cors().allow_headers(["x-token"]).allow_methods(["GET", "PUT"]);
        let response = run(middleware, preflight("https://x"), Ok200).await.unwrap();
        assert_eq!(response.header(ALLOW_HEADERS), Some("x-token"));
        assert_eq!(response.header(ALLOW_METHODS), Some("GET,PUT"));
    }

    #[tokio::test]
    async fn plain_options_is_not_a_preflight() {
        let req = Request::new(Method::Options, "/").with_header("Origin", "https://x");
        let response = run(cors(), req, Ok200).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(!response.has_header(ALLOW_METHODS));
        assert!(!response.has_header(ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn expose_headers_on_simple_requests() {
        let response = run(cors().expose_headers(["x-request-id"]), get(None), Ok200).await.unwrap();
        assert_eq!(response.header(EXPOSE_HEADERS), Some("x-request-id"));
    }
}
