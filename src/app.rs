//! The application: global middleware, mounted routers and built-in routes.
//!
//! # Request handling
//!
//! ```text
//! to_request ─► request id ─► base path ─► health check ─► middleware ─► routers ─► 404
//!                                 │404          │200/503                          │
//!                                 ▼             ▼                                 ▼
//!                     error boundary (Error → JSON envelope) ─► request id header ─► to_response
//! ```
//!
//! An [`App`] is immutable once built and is shared by every in-flight
//! request. Drive it directly with [`App::fetch`] (edge hosts, tests) or
//! hand it to a [`Server`](crate::Server).

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use tracing::{debug, error};

use crate::adapter;
use crate::config::{Config, HealthCheckConfig, RequestIdConfig, Toggle};
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::health::HealthCheck;
use crate::method::Method;
use crate::middleware::{REQUEST_ID_KEY, RequestIdOptions};
use crate::pipeline::{self, BoxFuture, BoxedMiddleware, Endpoint, Middleware, verify_contracts};
use crate::request::Request;
use crate::response::{Outcome, Response};
use crate::router::Router;

/// Passed to the `on_started` hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Started {
    /// The bound port; differs from the configured one when that was `0`.
    pub port: u16,
    pub hostname: String,
}

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_started: Option<Arc<dyn Fn(&Started) + Send + Sync>>,
    pub(crate) on_stopping: Option<Arc<dyn Fn() + Send + Sync>>,
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles an [`App`].
///
/// ```rust,ignore
/// let app = App::builder()
///     .base_path("/api")
///     .use_middleware(logger())
///     .use_middleware(cors())
///     .mount("/items", items_router())
///     .health_check(HealthCheck::new().check(|| async { db.ping().await }))
///     .build()?;
/// ```
///
/// [`config`](AppBuilder::config) replaces every serialisable setting at
/// once, so call it before the individual setters.
pub struct AppBuilder {
    config: Config,
    middleware: Vec<BoxedMiddleware>,
    mounts: Vec<(String, Router)>,
    health: HealthCheck,
    request_id: RequestIdOptions,
    hooks: Hooks,
}

impl AppBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            middleware: Vec::new(),
            mounts: Vec::new(),
            health: HealthCheck::new(),
            request_id: RequestIdOptions::new(),
            hooks: Hooks::default(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.base_path = Some(base_path.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn graceful_shutdown(mut self, enabled: bool) -> Self {
        self.config.graceful_shutdown = enabled;
        self
    }

    /// Enables the health route with a custom path and/or check.
    pub fn health_check(mut self, health: HealthCheck) -> Self {
        self.config.health_check = Toggle::Custom(HealthCheckConfig { path: health.probe_path().to_owned() });
        self.health = health;
        self
    }

    pub fn disable_health_check(mut self) -> Self {
        self.config.health_check = Toggle::Enabled(false);
        self
    }

    pub fn request_id_header(mut self, name: impl Into<String>) -> Self {
        self.config.request_id = Toggle::Custom(RequestIdConfig { header_name: name.into() });
        self
    }

    pub fn request_id_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.request_id = self.request_id.generator(generator);
        self
    }

    pub fn disable_request_id(mut self) -> Self {
        self.config.request_id = Toggle::Enabled(false);
        self
    }

    /// Appends a global middleware. Runs in registration order.
    pub fn use_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Mounts `router` under `prefix`. Routers are tried in mount order.
    pub fn mount(mut self, prefix: &str, router: Router) -> Self {
        self.mounts.push((normalize_prefix(prefix).unwrap_or_default(), router));
        self
    }

    /// Mounts `router` at the root.
    pub fn router(self, router: Router) -> Self {
        self.mount("/", router)
    }

    pub fn on_started(mut self, hook: impl Fn(&Started) + Send + Sync + 'static) -> Self {
        self.hooks.on_started = Some(Arc::new(hook));
        self
    }

    pub fn on_stopping(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_stopping = Some(Arc::new(hook));
        self
    }

    /// Finalises the application.
    ///
    /// Fails with [`Error::MissingState`] if a middleware requires state that
    /// no earlier middleware provides.
    pub fn build(self) -> Result<App, Error> {
        let request_id = self
            .config
            .request_id
            .resolve()
            .map(|options| self.request_id.header_name(&options.header_name));

        let seeded: &[&'static str] = if request_id.is_some() { &[REQUEST_ID_KEY] } else { &[] };
        verify_contracts(&self.middleware, seeded)?;

        let health = self.config.health_check.resolve().map(|options| self.health.path(options.path));

        Ok(App {
            base_path: self.config.base_path.as_deref().and_then(normalize_prefix),
            config: self.config,
            middleware: self.middleware,
            mounts: Mounts(self.mounts),
            health,
            request_id,
            hooks: self.hooks,
        })
    }
}

/// `"api/"` → `Some("/api")`; `""` and `"/"` → `None`.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("/{trimmed}"))
}

/// Removes a normalised prefix from `path`, on a segment boundary.
fn strip_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

// ── Routing endpoint ──────────────────────────────────────────────────────────

/// The innermost pipeline step: first matching route across all mounts.
struct Mounts(Vec<(String, Router)>);

impl Endpoint for Mounts {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        for (prefix, router) in &self.0 {
            let Some(rest) = strip_prefix(&ctx.request.path, prefix) else { continue };
            if let Some(fut) = router.dispatch(ctx, rest) {
                return fut;
            }
        }
        Box::pin(std::future::ready(Ok(Response::not_found())))
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

pub struct App {
    config: Config,
    base_path: Option<String>,
    middleware: Vec<BoxedMiddleware>,
    mounts: Mounts,
    health: Option<HealthCheck>,
    request_id: Option<RequestIdOptions>,
    pub(crate) hooks: Hooks,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handles one native request end to end. Never fails: every error
    /// becomes a response.
    pub async fn fetch<B>(&self, native: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: Into<BoxError>,
    {
        let inbound_id = self.request_id.as_ref().and_then(|options| {
            native.headers().get(options.name()).and_then(|v| v.to_str().ok()).map(str::to_owned)
        });

        let response = match adapter::to_request(native, self.config.max_body_size).await {
            Ok(request) => self.handle(request).await,
            Err(error) => {
                let id = self.request_id.as_ref().map(|options| options.reuse_or_generate(inbound_id.as_deref()));
                self.finish(recover(error), id.as_deref())
            }
        };

        adapter::to_response(response).unwrap_or_else(|error| {
            error!(%error, "response could not be serialised");
            let mut fallback = http::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }

    /// Handles one canonical request. Never fails.
    pub async fn handle(&self, request: Request) -> Response {
        let id = self.request_id.as_ref().map(|options| options.resolve(&request));
        let response = self.respond(request, id.clone()).await.unwrap_or_else(recover);
        self.finish(response, id.as_deref())
    }

    async fn respond(&self, mut request: Request, id: Option<String>) -> Outcome {
        if let Some(base_path) = &self.base_path {
            let Some(rest) = strip_prefix(&request.path, base_path).map(str::to_owned) else {
                return Ok(Response::not_found());
            };
            request.path = rest;
        }

        if let Some(health) = &self.health {
            if request.method == Method::Get && health.matches(&request.path) {
                return Ok(health.run().await);
            }
        }

        let mut ctx = Context::new(request);
        if let Some(id) = id {
            ctx.state.set(REQUEST_ID_KEY, id);
        }
        pipeline::execute(&self.middleware, &mut ctx, &self.mounts).await
    }

    fn finish(&self, mut response: Response, id: Option<&str>) -> Response {
        if let (Some(options), Some(id)) = (&self.request_id, id) {
            options.stamp(&mut response, id);
        }
        response
    }
}

/// The error boundary.
fn recover(error: Error) -> Response {
    let status = error.status_code();
    if status >= 500 {
        error!(%error, "request failed");
    } else {
        debug!(%error, status, "request rejected");
    }
    error.into_response()
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("middleware", &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("mounts", &self.mounts.0.iter().map(|(prefix, _)| prefix).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
