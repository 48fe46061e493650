//! Built-in middleware.
//!
//! | Constructor | Effect | Provides |
//! |---|---|---|
//! | [`cors`] | CORS headers, preflight short-circuit | |
//! | [`secure_headers`] | security response headers | |
//! | [`basic_auth`] / [`bearer_auth`] | `Authorization` checks, `401` challenge | `username` / `token` |
//! | [`logger`] | one line per request after the response | |
//! | [`request_id`] | id reuse or generation, response header | `requestId` |
//! | [`powered_by`] | `x-powered-by` header | |
//! | [`scoped`] / [`except`] | apply another middleware by path | |
//!
//! Register them on the application in the order they should run:
//!
//! ```rust,ignore
//! let app = App::builder()
//!     .use_middleware(logger())
//!     .use_middleware(cors().origins(["https://app.example.com"]).credentials(true))
//!     .use_middleware(scoped(["/api/*"], secure_headers())?)
//!     .use_middleware(basic_auth(|user: &str, pass: &str, _: &Context| user == "admin" && pass == "s3cret"))
//!     .router(routes)
//!     .build()?;
//! ```

mod auth;
mod cors;
mod logger;
mod powered_by;
mod request_id;
mod scope;
mod secure_headers;

pub use auth::{BasicAuth, BearerAuth, IntoVerdict, basic_auth, bearer_auth};
pub use cors::{AllowOrigin, Cors, cors};
pub use logger::{LogLine, Logger, logger};
pub use powered_by::{PoweredBy, powered_by};
pub use request_id::{REQUEST_ID_KEY, RequestId, RequestIdOptions, request_id};
pub use scope::{Scoped, except, scoped};
pub use secure_headers::{SecureHeaders, secure_headers};
