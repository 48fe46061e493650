//! Request id propagation.
//!
//! An inbound `x-request-id` (or the configured header) is reused, first value
//! if repeated; otherwise a UUID v7 is generated. The id is exposed to
//! downstream code as state key `requestId` and echoed on the response.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{DEFAULT_REQUEST_ID_HEADER, RequestIdConfig};
use crate::context::Context;
use crate::pipeline::{BoxFuture, Contract, Middleware, Next};
use crate::request::Request;
use crate::response::{Outcome, Response};
use crate::state::State;

/// State key holding the request id as a `String`.
pub const REQUEST_ID_KEY: &str = "requestId";

type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// Where the id lives on the wire and how fresh ones are made.
#[derive(Clone)]
pub struct RequestIdOptions {
    header_name: String,
    generator: Generator,
}

impl RequestIdOptions {
    pub fn new() -> Self {
        Self {
            header_name: DEFAULT_REQUEST_ID_HEADER.to_owned(),
            generator: Arc::new(|| Uuid::now_v7().to_string()),
        }
    }

    pub fn header_name(mut self, name: &str) -> Self {
        self.header_name = name.to_ascii_lowercase();
        self
    }

    pub fn generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn name(&self) -> &str {
        &self.header_name
    }

    /// The inbound id, or a freshly generated one.
    pub fn resolve(&self, request: &Request) -> String {
        self.reuse_or_generate(request.header(&self.header_name))
    }

    pub(crate) fn reuse_or_generate(&self, inbound: Option<&str>) -> String {
        match inbound {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => (self.generator)(),
        }
    }

    /// Puts `id` on the response unless a handler already set the header.
    pub fn stamp(&self, response: &mut Response, id: &str) {
        if !response.has_header(&self.header_name) {
            response.set_header(&self.header_name, id);
        }
    }
}

impl Default for RequestIdOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<RequestIdConfig> for RequestIdOptions {
    fn from(config: RequestIdConfig) -> Self {
        Self::new().header_name(&config.header_name)
    }
}

impl fmt::Debug for RequestIdOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestIdOptions").field("header_name", &self.header_name).finish_non_exhaustive()
    }
}

/// See the [module docs](self).
#[derive(Clone, Debug, Default)]
pub struct RequestId {
    options: RequestIdOptions,
}

pub fn request_id() -> RequestId {
    RequestId::default()
}

impl RequestId {
    pub fn with_options(options: RequestIdOptions) -> Self {
        Self { options }
    }
}

impl Middleware for RequestId {
    fn name(&self) -> &'static str {
        "requestId"
    }

    fn contract(&self) -> Contract {
        Contract::provides(&[REQUEST_ID_KEY])
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            // The application may already have resolved one.
            let id = match ctx.state.get::<String>(REQUEST_ID_KEY) {
                Some(id) => id.clone(),
                None => self.options.resolve(&ctx.request),
            };

            let mut response = next.run_with(ctx, State::new().with(REQUEST_ID_KEY, id.clone())).await?;
            self.options.stamp(&mut response, &id);
            Ok(response)
        })
    }
}
