//! HTTP Basic and Bearer authentication.
//!
//! Both read `Authorization`, hand the credentials to a verification
//! callback and either continue with the credentials in state or answer
//! `401` with a `WWW-Authenticate` challenge. A verification error counts
//! as a rejection and is logged, never propagated.
//!
//! Verification callbacks may be synchronous (`new`) or return a future
//! (`new_async`):
//!
//! ```rust,ignore
//! let auth = BasicAuth::new(|user, pass, _ctx| user == "admin" && pass == "s3cret");
//!
//! fn lookup<'a>(token: &'a str, _ctx: &'a Context) -> BoxFuture<'a, Result<bool, DbError>> {
//!     Box::pin(async move { db::token_exists(token).await })
//! }
//! let auth = BearerAuth::new_async(lookup);
//! ```

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use crate::context::Context;
use crate::pipeline::{BoxFuture, Contract, Middleware, Next};
use crate::response::{Outcome, Response};
use crate::state::State;

const DEFAULT_REALM: &str = "Secure Area";

/// State key holding the authenticated user name.
pub const USERNAME_KEY: &str = "username";
/// State key holding the accepted bearer token.
pub const TOKEN_KEY: &str = "token";

// ── Verdicts ──────────────────────────────────────────────────────────────────

/// What a verification callback may return.
pub trait IntoVerdict {
    /// `Ok(true)` admits the request; anything else rejects it.
    fn into_verdict(self) -> Result<bool, String>;
}

impl IntoVerdict for bool {
    fn into_verdict(self) -> Result<bool, String> {
        Ok(self)
    }
}

impl<E: fmt::Display> IntoVerdict for Result<bool, E> {
    fn into_verdict(self) -> Result<bool, String> {
        self.map_err(|e| e.to_string())
    }
}

fn admitted(verdict: Result<bool, String>, scheme: &str) -> bool {
    match verdict {
        Ok(ok) => ok,
        Err(message) => {
            tracing::warn!(scheme, %message, "credential verification failed");
            false
        }
    }
}

// ── Shared options ────────────────────────────────────────────────────────────

type Unauthorized = Arc<dyn Fn(&Context) -> Response + Send + Sync>;

#[derive(Clone)]
struct Challenge {
    realm: String,
    message: Option<String>,
    on_unauthorized: Option<Unauthorized>,
}

impl Challenge {
    fn new() -> Self {
        Self { realm: DEFAULT_REALM.to_owned(), message: None, on_unauthorized: None }
    }

    /// `on_unauthorized` wins over everything else.
    fn respond(&self, ctx: &Context, www_authenticate: String) -> Response {
        if let Some(custom) = &self.on_unauthorized {
            return custom(ctx);
        }
        let message = self.message.as_deref().unwrap_or("Unauthorized");
        Response::json(json!({ "error": "unauthorized", "message": message }))
            .with_status(401)
            .with_header("www-authenticate", www_authenticate)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("realm", &self.realm)
            .field("message", &self.message)
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .finish()
    }
}

macro_rules! challenge_setters {
    () => {
        /// Realm named in the `WWW-Authenticate` challenge.
        pub fn realm(mut self, realm: impl Into<String>) -> Self {
            self.challenge.realm = realm.into();
            self
        }

        /// Message in the default `401` body.
        pub fn message(mut self, message: impl Into<String>) -> Self {
            self.challenge.message = Some(message.into());
            self
        }

        /// Builds the whole `401` response instead of the default.
        pub fn on_unauthorized(mut self, respond: impl Fn(&Context) -> Response + Send + Sync + 'static) -> Self {
            self.challenge.on_unauthorized = Some(Arc::new(respond));
            self
        }
    };
}

// ── Basic ─────────────────────────────────────────────────────────────────────

trait VerifyBasic: Send + Sync {
    fn verify<'a>(&'a self, username: &'a str, password: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<bool, String>>;
}

struct SyncBasic<F>(F);

impl<F, R> VerifyBasic for SyncBasic<F>
where
    F: Fn(&str, &str, &Context) -> R + Send + Sync,
    R: IntoVerdict,
{
    fn verify<'a>(&'a self, username: &'a str, password: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<bool, String>> {
        let verdict = (self.0)(username, password, ctx).into_verdict();
        Box::pin(std::future::ready(verdict))
    }
}

struct AsyncBasic<F>(F);

impl<F, R> VerifyBasic for AsyncBasic<F>
where
    F: for<'a> Fn(&'a str, &'a str, &'a Context) -> BoxFuture<'a, R> + Send + Sync,
    R: IntoVerdict + 'static,
{
    fn verify<'a>(&'a self, username: &'a str, password: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<bool, String>> {
        let fut = (self.0)(username, password, ctx);
        Box::pin(async move { fut.await.into_verdict() })
    }
}

/// `Authorization: Basic base64(user:pass)`.
///
/// The decoded pair is split on the first colon, so passwords may contain
/// colons. On success the user name is provided as state `username`.
#[derive(Clone)]
pub struct BasicAuth {
    verify: Arc<dyn VerifyBasic>,
    challenge: Challenge,
}

pub fn basic_auth<F, R>(verify: F) -> BasicAuth
where
    F: Fn(&str, &str, &Context) -> R + Send + Sync + 'static,
    R: IntoVerdict + 'static,
{
    BasicAuth::new(verify)
}

impl BasicAuth {
    pub fn new<F, R>(verify: F) -> Self
    where
        F: Fn(&str, &str, &Context) -> R + Send + Sync + 'static,
        R: IntoVerdict + 'static,
    {
        Self { verify: Arc::new(SyncBasic(verify)), challenge: Challenge::new() }
    }

    pub fn new_async<F, R>(verify: F) -> Self
    where
        F: for<'a> Fn(&'a str, &'a str, &'a Context) -> BoxFuture<'a, R> + Send + Sync + 'static,
        R: IntoVerdict + 'static,
    {
        Self { verify: Arc::new(AsyncBasic(verify)), challenge: Challenge::new() }
    }

    challenge_setters!();

    fn reject(&self, ctx: &Context) -> Response {
        self.challenge.respond(ctx, format!("Basic realm=\"{}\"", self.challenge.realm))
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth").field("challenge", &self.challenge).finish_non_exhaustive()
    }
}

/// Decodes `Basic <base64>` into `(user, pass)`.
fn basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

impl Middleware for BasicAuth {
    fn name(&self) -> &'static str {
        "basicAuth"
    }

    fn contract(&self) -> Contract {
        Contract::provides(&[USERNAME_KEY])
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let Some((username, password)) = ctx.request.header("authorization").and_then(basic_credentials) else {
                return Ok(self.reject(ctx));
            };

            let verdict = self.verify.verify(&username, &password, ctx).await;
            if !admitted(verdict, "basic") {
                return Ok(self.reject(ctx));
            }
            next.run_with(ctx, State::new().with(USERNAME_KEY, username)).await
        })
    }
}

// ── Bearer ────────────────────────────────────────────────────────────────────

trait VerifyBearer: Send + Sync {
    fn verify<'a>(&'a self, token: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<bool, String>>;
}

struct SyncBearer<F>(F);

impl<F, R> VerifyBearer for SyncBearer<F>
where
    F: Fn(&str, &Context) -> R + Send + Sync,
    R: IntoVerdict,
{
    fn verify<'a>(&'a self, token: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<bool, String>> {
        let verdict = (self.0)(token, ctx).into_verdict();
        Box::pin(std::future::ready(verdict))
    }
}

struct AsyncBearer<F>(F);

impl<F, R> VerifyBearer for AsyncBearer<F>
where
    F: for<'a> Fn(&'a str, &'a Context) -> BoxFuture<'a, R> + Send + Sync,
    R: IntoVerdict + 'static,
{
    fn verify<'a>(&'a self, token: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<bool, String>> {
        let fut = (self.0)(token, ctx);
        Box::pin(async move { fut.await.into_verdict() })
    }
}

/// `Authorization: Bearer <token>`.
///
/// A malformed header is challenged with `error="invalid_request"`, a
/// rejected token with `error="invalid_token"`. On success the token is
/// provided as state `token`.
#[derive(Clone)]
pub struct BearerAuth {
    verify: Arc<dyn VerifyBearer>,
    challenge: Challenge,
}

pub fn bearer_auth<F, R>(verify: F) -> BearerAuth
where
    F: Fn(&str, &Context) -> R + Send + Sync + 'static,
    R: IntoVerdict + 'static,
{
    BearerAuth::new(verify)
}

impl BearerAuth {
    pub fn new<F, R>(verify: F) -> Self
    where
        F: Fn(&str, &Context) -> R + Send + Sync + 'static,
        R: IntoVerdict + 'static,
    {
        Self { verify: Arc::new(SyncBearer(verify)), challenge: Challenge::new() }
    }

    pub fn new_async<F, R>(verify: F) -> Self
    where
        F: for<'a> Fn(&'a str, &'a Context) -> BoxFuture<'a, R> + Send + Sync + 'static,
        R: IntoVerdict + 'static,
    {
        Self { verify: Arc::new(AsyncBearer(verify)), challenge: Challenge::new() }
    }

    challenge_setters!();

    fn reject(&self, ctx: &Context, error: Option<&str>) -> Response {
        let mut value = format!("Bearer realm=\"{}\"", self.challenge.realm);
        if let Some(error) = error {
            value.push_str(&format!(", error=\"{error}\""));
        }
        self.challenge.respond(ctx, value)
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").field("challenge", &self.challenge).finish_non_exhaustive()
    }
}

/// RFC 6750 `b64token`.
fn is_token68(token: &str) -> bool {
    let trimmed = token.trim_end_matches('=');
    !trimmed.is_empty()
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'/'))
}

enum BearerHeader {
    Missing,
    Malformed,
    Token(String),
}

fn bearer_token(header: Option<&str>) -> BearerHeader {
    let Some(header) = header else { return BearerHeader::Missing };
    match header.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && is_token68(token.trim()) => {
            BearerHeader::Token(token.trim().to_owned())
        }
        _ => BearerHeader::Malformed,
    }
}

impl Middleware for BearerAuth {
    fn name(&self) -> &'static str {
        "bearerAuth"
    }

    fn contract(&self) -> Contract {
        Contract::provides(&[TOKEN_KEY])
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let token = match bearer_token(ctx.request.header("authorization")) {
                BearerHeader::Token(token) => token,
                BearerHeader::Missing => return Ok(self.reject(ctx, None)),
                BearerHeader::Malformed => return Ok(self.reject(ctx, Some("invalid_request"))),
            };

            let verdict = self.verify.verify(&token, ctx).await;
            if !admitted(verdict, "bearer") {
                return Ok(self.reject(ctx, Some("invalid_token")));
            }
            next.run_with(ctx, State::new().with(TOKEN_KEY, token)).await
        })
    }
}
