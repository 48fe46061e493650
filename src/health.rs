//! Built-in health-check route.
//!
//! Load balancers and Kubernetes probes ask one question: can this process
//! serve traffic? The application answers on `GET /health` (configurable)
//! before any middleware runs.
//!
//! | Check | Result |
//! |---|---|
//! | none configured | `200 {"status":"ok"}` |
//! | returns `Ok(value)` | `200` with `value` as JSON |
//! | returns `Err(e)` | `503 {"status":"error","message": e.to_string()}` |
//!
//! ```rust,ignore
//! let app = App::builder()
//!     .health_check(HealthCheck::new().path("/healthz").check(|| async {
//!         db.ping().await?;
//!         Ok::<_, DbError>(json!({ "status": "ok", "db": "up" }))
//!     }))
//!     .build()?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::DEFAULT_HEALTH_PATH;
use crate::pipeline::BoxFuture;
use crate::response::Response;

type CheckFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

#[derive(Clone)]
pub struct HealthCheck {
    path: String,
    check: Option<CheckFn>,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self { path: DEFAULT_HEALTH_PATH.to_owned(), check: None }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the function run on every probe.
    pub fn check<F, Fut, T, E>(mut self, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        self.check = Some(Arc::new(move || -> BoxFuture<'static, Result<Value, String>> {
            let fut = check();
            Box::pin(async move {
                match fut.await {
                    Ok(report) => serde_json::to_value(report).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            })
        }));
        self
    }

    pub fn probe_path(&self) -> &str {
        &self.path
    }

    pub(crate) fn matches(&self, path: &str) -> bool {
        self.path == path
    }

    /// Runs the check and renders the probe response. Never fails.
    pub async fn run(&self) -> Response {
        let Some(check) = &self.check else {
            return Response::json(json!({ "status": "ok" }));
        };
        match check().await {
            Ok(report) => Response::json(report),
            Err(message) => {
                tracing::warn!(%message, "health check failed");
                Response::json(json!({ "status": "error", "message": message })).with_status(503)
            }
        }
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheck")
            .field("path", &self.path)
            .field("custom_check", &self.check.is_some())
            .finish()
    }
}
