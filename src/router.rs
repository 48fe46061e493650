//! Ordered request router.
//!
//! Routes are tried in registration order and the first one whose method and
//! path both match wins. No match is not an error: [`Router::dispatch`]
//! returns `None` so the application can try the next mounted router.

use crate::context::Context;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::path::PathMatcher;
use crate::pipeline::BoxFuture;
use crate::response::Outcome;
use crate::validate::{Unvalidated, Validator};

/// One registered route. Immutable once built.
pub struct Route {
    method: Method,
    matcher: PathMatcher,
    handler: BoxedHandler,
}

impl Route {
    pub fn new<V, H>(method: Method, pattern: &str, validator: V, handler: H) -> Self
    where
        V: Validator,
        H: Handler<V>,
    {
        Self {
            method,
            matcher: PathMatcher::new(pattern),
            handler: handler.into_boxed_handler(validator),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.matcher.pattern())
            .finish_non_exhaustive()
    }
}

/// An ordered route table.
///
/// Build it once at startup and mount it on an [`App`](crate::App). Each
/// registration returns `self` so calls chain:
///
/// ```rust,ignore
/// Router::new()
///     .get("/items", list_items)
///     .get("/items/:id", get_item)
///     .on(Method::Post, "/items", new_item, create_item);
/// ```
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Registers a handler whose input is produced by `validator`.
    pub fn on<V, H>(self, method: Method, path: &str, validator: V, handler: H) -> Self
    where
        V: Validator,
        H: Handler<V>,
    {
        self.route(Route::new(method, path, validator, handler))
    }

    pub fn get<H: Handler<Unvalidated>>(self, path: &str, handler: H) -> Self {
        self.on(Method::Get, path, Unvalidated, handler)
    }

    pub fn post<H: Handler<Unvalidated>>(self, path: &str, handler: H) -> Self {
        self.on(Method::Post, path, Unvalidated, handler)
    }

    pub fn put<H: Handler<Unvalidated>>(self, path: &str, handler: H) -> Self {
        self.on(Method::Put, path, Unvalidated, handler)
    }

    pub fn patch<H: Handler<Unvalidated>>(self, path: &str, handler: H) -> Self {
        self.on(Method::Patch, path, Unvalidated, handler)
    }

    pub fn delete<H: Handler<Unvalidated>>(self, path: &str, handler: H) -> Self {
        self.on(Method::Delete, path, Unvalidated, handler)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Finds the first route matching the context's method and `path`.
    ///
    /// `path` is the request path with any mount prefix already removed. On a
    /// match the handler receives a copy of the request with `param` filled in
    /// (left `None` when the pattern binds nothing).
    pub fn dispatch(&self, ctx: &Context, path: &str) -> Option<BoxFuture<'static, Outcome>> {
        let route = self
            .routes
            .iter()
            .filter(|route| route.method == ctx.request.method)
            .find_map(|route| route.matcher.captures(path).map(|params| (route, params)));

        let (route, params) = route?;
        let mut request = ctx.request.clone();
        if !params.is_empty() {
            request.param = Some(params);
        }
        let mut handler_ctx = ctx.clone();
        handler_ctx.request.param.clone_from(&request.param);
        Some(route.handler.call(request, handler_ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::request::Request;
    use crate::response::Response;

    async fn list(_req: Request, _ctx: Context) -> &'static str {
        "list"
    }

    async fn show(req: Request, _ctx: Context) -> Response {
        Response::text(format!("show {}", req.param("id").unwrap_or("?")))
    }

    fn items() -> Router {
        Router::new().get("/items", list).get("/items/:id", show)
    }

    async fn run(router: &Router, method: Method, path: &str) -> Option<Response> {
        let ctx = Context::new(Request::new(method, path));
        let fut = router.dispatch(&ctx, path)?;
        Some(fut.await.unwrap())
    }

    #[tokio::test]
    async fn param_route_binds_id() {
        let response = run(&items(), Method::Get, "/items/42").await.unwrap();
        assert_eq!(response.body, Some(Body::from("show 42")));
    }

    #[tokio::test]
    async fn extra_segment_is_no_match() {
        assert!(run(&items(), Method::Get, "/items/42/extra").await.is_none());
    }

    #[tokio::test]
    async fn method_must_agree() {
        assert!(run(&items(), Method::Post, "/items").await.is_none());
    }

    #[tokio::test]
    async fn first_registration_wins() {
        async fn first(_req: Request, _ctx: Context) -> &'static str {
            "first"
        }
        async fn second(_req: Request, _ctx: Context) -> &'static str {
            "second"
        }

        let router = Router::new().get("/a/*", first).get("/a/b", second);
        let response = run(&router, Method::Get, "/a/b").await.unwrap();
        assert_eq!(response.body, Some(Body::from("first")));
    }

    #[test]
    fn routes_are_listed_in_order() {
        let router = items();
        let patterns: Vec<_> = router.routes().iter().map(Route::pattern).collect();
        assert_eq!(patterns, ["/items", "/items/:id"]);
    }
}
