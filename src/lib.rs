//! # pipework
//!
//! An onion-model request pipeline for HTTP services.
//!
//! A request passes inward through an ordered list of middleware, reaches a
//! route handler, and the response passes back outward through the same
//! middleware in reverse. Every middleware decides for itself whether to
//! continue, short-circuit, or rewrite the result on the way out.
//!
//! What the crate provides:
//!
//! - A canonical [`Request`] / [`Response`] model with parsed bodies
//!   (JSON, URL-encoded forms, multipart) and a body-size limit
//! - Middleware with [`Next`], state hand-off and build-time state
//!   [`Contract`]s
//! - Segment-based routing with `:param` and trailing `*`
//! - Per-route [`Validator`]s that turn bad input into a structured 400
//! - An [`App`] with base path, health check, request ids and a JSON error
//!   boundary, usable directly through [`App::fetch`] or behind a [`Server`]
//! - Built-in [`middleware`]: CORS, secure headers, basic and bearer auth,
//!   request logging, request ids, `x-powered-by`, path scoping
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pipework::middleware::{cors, logger};
//! use pipework::{App, Context, Error, Json, Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let items = Router::new()
//!         .get("/:id", get_item)
//!         .post("/", create_item);
//!
//!     let app = App::builder()
//!         .base_path("/api")
//!         .use_middleware(logger())
//!         .use_middleware(cors())
//!         .mount("/items", items)
//!         .build()?;
//!
//!     Server::new(app).serve().await
//! }
//!
//! async fn get_item(req: Request, _ctx: Context) -> Json<serde_json::Value> {
//!     Json(serde_json::json!({ "id": req.param("id") }))
//! }
//!
//! async fn create_item(req: Request, _ctx: Context) -> Result<&'static str, Error> {
//!     match req.body.as_ref().and_then(|b| b.as_json()) {
//!         Some(_) => Ok("created"),
//!         None => Err(pipework::ValidationError::new()
//!             .with_issue(pipework::Location::Body, ["body"], "expected a JSON object")
//!             .into()),
//!     }
//! }
//! ```

mod app;
mod body;
mod config;
mod context;
mod error;
mod handler;
mod health;
mod method;
mod path;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod state;
mod validate;

pub mod adapter;
pub mod middleware;

pub use app::{App, AppBuilder, Started};
pub use body::{Body, Fields, Headers, OneOrMany, Part};
pub use config::{Config, HealthCheckConfig, RequestIdConfig, Toggle};
pub use context::Context;
pub use error::{BoxError, Error};
pub use handler::Handler;
pub use health::HealthCheck;
pub use method::Method;
pub use path::PathMatcher;
pub use pipeline::{
    BoxFuture, BoxedMiddleware, Contract, Endpoint, FnMiddleware, Middleware, Next, Typed, execute, from_fn, typed,
    verify_contracts,
};
pub use request::Request;
pub use response::{IntoOutcome, IntoResponse, Json, Outcome, Response};
pub use router::{Route, Router};
pub use server::{Phase, Server};
pub use state::State;
pub use validate::{Issue, Location, Unvalidated, Validation, ValidationError, Validator};
