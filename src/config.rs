//! Application configuration.
//!
//! Everything here can be loaded from JSON. Behaviour that needs code
//! (the health check function, a request-id generator, lifecycle hooks) is
//! attached through [`AppBuilder`](crate::AppBuilder) instead.
//!
//! ```rust
//! use pipework::Config;
//!
//! let config = Config::from_json(r#"{
//!     "basePath": "/api",
//!     "port": 8080,
//!     "healthCheck": { "path": "/healthz" },
//!     "requestId": false
//! }"#).unwrap();
//!
//! assert_eq!(config.port, 8080);
//! assert!(config.request_id.resolve().is_none());
//! ```

use serde::{Deserialize, Serialize};

use crate::adapter::DEFAULT_MAX_BODY_SIZE;
use crate::error::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOSTNAME: &str = "0.0.0.0";
pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Prefix every request path must carry; stripped before routing.
    pub base_path: Option<String>,
    pub port: u16,
    pub hostname: String,
    /// Largest accepted request body, in bytes (inclusive).
    pub max_body_size: usize,
    /// Wait for in-flight requests on stop instead of aborting them.
    pub graceful_shutdown: bool,
    pub health_check: Toggle<HealthCheckConfig>,
    pub request_id: Toggle<RequestIdConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: None,
            port: DEFAULT_PORT,
            hostname: DEFAULT_HOSTNAME.to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            graceful_shutdown: true,
            health_check: Toggle::default(),
            request_id: Toggle::default(),
        }
    }
}

impl Config {
    pub fn from_json(source: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(source)?)
    }
}

/// A feature that is either switched on or off, or switched on with options.
///
/// Deserialises from `true`, `false` or an options object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Toggle<T> {
    Enabled(bool),
    Custom(T),
}

impl<T> Default for Toggle<T> {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

impl<T: Default + Clone> Toggle<T> {
    /// The effective options, or `None` when the feature is off.
    pub fn resolve(&self) -> Option<T> {
        match self {
            Self::Enabled(true) => Some(T::default()),
            Self::Enabled(false) => None,
            Self::Custom(options) => Some(options.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { path: DEFAULT_HEALTH_PATH.to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestIdConfig {
    pub header_name: String,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self { header_name: DEFAULT_REQUEST_ID_HEADER.to_owned() }
    }
}
