//! Onion-model middleware composition.
//!
//! # Execution order
//!
//! ```text
//! execute([a, b], ctx, endpoint)
//!
//!   a: before ─┐
//!     b: before ─┐
//!       endpoint │
//!     b: after  ─┘
//!   a: after  ─┘
//! ```
//!
//! Code before `next.run(..)` runs in registration order, code after it in
//! exact reverse order. A middleware that never calls `next` short-circuits
//! the rest of the chain. Calling `next` a second time fails with
//! [`Error::NextCalledTwice`] and runs nothing. Errors propagate unchanged;
//! this layer catches nothing.
//!
//! # State contracts
//!
//! A middleware may declare the state keys it [`provides`](Contract::provides)
//! (passed downstream via [`Next::run_with`]) and the keys it
//! [`requires`](Contract::requires) from earlier middleware. The application
//! checks the ordering once, when it is built, with [`verify_contracts`].

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::Context;
use crate::error::Error;
use crate::response::Outcome;
use crate::state::State;

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased middleware shared across concurrent requests.
pub type BoxedMiddleware = Arc<dyn Middleware>;

// ── Contracts ─────────────────────────────────────────────────────────────────

/// The state keys a middleware writes and the keys it expects to find.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Contract {
    pub provides: &'static [&'static str],
    pub requires: &'static [&'static str],
}

impl Contract {
    pub const EMPTY: Self = Self { provides: &[], requires: &[] };

    pub const fn new(provides: &'static [&'static str], requires: &'static [&'static str]) -> Self {
        Self { provides, requires }
    }

    pub const fn provides(keys: &'static [&'static str]) -> Self {
        Self { provides: keys, requires: &[] }
    }

    pub const fn requires(keys: &'static [&'static str]) -> Self {
        Self { provides: &[], requires: keys }
    }

    pub fn is_empty(&self) -> bool {
        self.provides.is_empty() && self.requires.is_empty()
    }
}

/// Checks that every required key was provided by some earlier middleware.
///
/// `seeded` lists keys available before the first middleware runs.
pub fn verify_contracts(stack: &[BoxedMiddleware], seeded: &[&'static str]) -> Result<(), Error> {
    let mut provided: HashSet<&'static str> = seeded.iter().copied().collect();
    for middleware in stack {
        let contract = middleware.contract();
        if let Some(key) = contract.requires.iter().find(|key| !provided.contains(*key)) {
            return Err(Error::MissingState { middleware: middleware.name(), key });
        }
        provided.extend(contract.provides);
    }
    Ok(())
}

// ── Middleware and endpoints ──────────────────────────────────────────────────

/// A unit of cross-cutting request processing.
///
/// ```rust,ignore
/// struct Timing;
///
/// impl Middleware for Timing {
///     fn name(&self) -> &'static str { "timing" }
///
///     fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
///         Box::pin(async move {
///             let start = Instant::now();
///             let response = next.run(ctx).await?;
///             Ok(response.with_header("server-timing", format!("app;dur={}", start.elapsed().as_millis())))
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs and contract errors.
    fn name(&self) -> &'static str;

    fn contract(&self) -> Contract {
        Contract::EMPTY
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// The innermost step of a pipeline.
///
/// Implemented for any `fn(&mut Context) -> BoxFuture<'_, Outcome>`.
pub trait Endpoint: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome>;
}

impl<F> Endpoint for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        (self)(ctx)
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// Handle to the remainder of the chain, given to each middleware.
///
/// May be invoked once. A second invocation resolves to
/// [`Error::NextCalledTwice`] without running anything downstream.
pub struct Next<'a> {
    chain: &'a [BoxedMiddleware],
    endpoint: &'a dyn Endpoint,
    owner: &'static str,
    called: AtomicBool,
}

impl<'a> Next<'a> {
    fn new(chain: &'a [BoxedMiddleware], endpoint: &'a dyn Endpoint, owner: &'static str) -> Self {
        Self { chain, endpoint, owner, called: AtomicBool::new(false) }
    }

    /// Runs the rest of the chain.
    pub fn run<'b>(&'b self, ctx: &'b mut Context) -> BoxFuture<'b, Outcome> {
        match self.claim() {
            Ok(()) => self.dispatch(ctx),
            Err(error) => Box::pin(std::future::ready(Err(error))),
        }
    }

    /// Merges `provided` into the request state, then runs the rest of the chain.
    pub fn run_with<'b>(&'b self, ctx: &'b mut Context, provided: State) -> BoxFuture<'b, Outcome> {
        match self.claim() {
            Ok(()) => {
                ctx.state.merge(provided);
                self.dispatch(ctx)
            }
            Err(error) => Box::pin(std::future::ready(Err(error))),
        }
    }

    fn claim(&self) -> Result<(), Error> {
        if self.called.swap(true, Ordering::AcqRel) {
            return Err(Error::NextCalledTwice { middleware: self.owner });
        }
        Ok(())
    }

    fn dispatch<'b>(&'b self, ctx: &'b mut Context) -> BoxFuture<'b, Outcome> {
        match self.chain.split_first() {
            Some((head, rest)) => head.call(ctx, Next::new(rest, self.endpoint, head.name())),
            None => self.endpoint.call(ctx),
        }
    }
}

/// Runs `ctx` through `middleware` in order and then into `endpoint`.
pub async fn execute(middleware: &[BoxedMiddleware], ctx: &mut Context, endpoint: &dyn Endpoint) -> Outcome {
    let next = Next::new(middleware, endpoint, "execute");
    next.run(ctx).await
}

// ── Function middleware ───────────────────────────────────────────────────────

/// A middleware built from a function.
///
/// ```rust,ignore
/// fn stamp<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
///     Box::pin(async move { Ok(next.run(ctx).await?.with_header("x-stamp", "1")) })
/// }
///
/// let app = App::builder().use_middleware(from_fn("stamp", stamp));
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

pub fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    FnMiddleware { name, func }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (self.func)(ctx, next)
    }
}

// ── Typed middleware ──────────────────────────────────────────────────────────

/// A middleware annotated with the state it provides and requires.
pub struct Typed<M> {
    contract: Contract,
    inner: M,
}

/// Attaches a state contract to `inner`.
///
/// The wrapped middleware hands its provided keys downstream with
/// [`Next::run_with`]; the application rejects an ordering in which a
/// required key has no earlier provider.
pub fn typed<M: Middleware>(contract: Contract, inner: M) -> Typed<M> {
    Typed { contract, inner }
}

impl<M: Middleware> Middleware for Typed<M> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn contract(&self) -> Contract {
        self.contract
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        self.inner.call(ctx, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::method::Method;
    use crate::request::Request;
    use crate::response::Response;
    use parking_lot::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        trace: Trace,
    }

    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                self.trace.lock().push(format!("{}:before", self.name));
                let response = next.run(ctx).await;
                self.trace.lock().push(format!("{}:after", self.name));
                response
            })
        }
    }

    struct Twice;

    impl Middleware for Twice {
        fn name(&self) -> &'static str {
            "twice"
        }

        fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                next.run(ctx).await?;
                next.run(ctx).await
            })
        }
    }

    struct Gate;

    impl Middleware for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn call<'a>(&'a self, _ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
            Box::pin(async { Ok(Response::new(403)) })
        }
    }

    struct Provider;

    impl Middleware for Provider {
        fn name(&self) -> &'static str {
            "provider"
        }

        fn contract(&self) -> Contract {
            Contract::provides(&["user"])
        }

        fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            Box::pin(async move { next.run_with(ctx, State::new().with("user", "ann".to_owned())).await })
        }
    }

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    fn ok(_ctx: &mut Context) -> BoxFuture<'_, Outcome> {
        Box::pin(async { Ok(Response::new(200)) })
    }

    fn echo_user(ctx: &mut Context) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            let user = ctx.state.get::<String>("user").cloned().unwrap_or_default();
            Ok(Response::text(user))
        })
    }

    fn passthrough<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { next.run(ctx).await })
    }

    fn recorders(names: &[&'static str], trace: &Trace) -> Vec<BoxedMiddleware> {
        names
            .iter()
            .map(|&name| Arc::new(Recorder { name, trace: Arc::clone(trace) }) as BoxedMiddleware)
            .collect()
    }

    #[tokio::test]
    async fn onion_order() {
        let trace: Trace = Arc::default();
        let stack = recorders(&["a", "b", "c"], &trace);

        let response = execute(&stack, &mut ctx(), &ok).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(
            *trace.lock(),
            ["a:before", "b:before", "c:before", "c:after", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn empty_chain_runs_endpoint() {
        let response = execute(&[], &mut ctx(), &ok).await.unwrap();
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn second_next_call_fails_without_rerunning() {
        let trace: Trace = Arc::default();
        let mut stack: Vec<BoxedMiddleware> = vec![Arc::new(Twice)];
        stack.extend(recorders(&["inner"], &trace));

        let result = execute(&stack, &mut ctx(), &ok).await;

        assert!(matches!(result, Err(Error::NextCalledTwice { middleware: "twice" })));
        assert_eq!(*trace.lock(), ["inner:before", "inner:after"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let trace: Trace = Arc::default();
        let mut stack = recorders(&["outer"], &trace);
        stack.push(Arc::new(Gate));
        stack.extend(recorders(&["never"], &trace));

        let response = execute(&stack, &mut ctx(), &ok).await.unwrap();

        assert_eq!(response.status_code, 403);
        assert_eq!(*trace.lock(), ["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn errors_propagate_unchanged() {
        fn failing(_ctx: &mut Context) -> BoxFuture<'_, Outcome> {
            Box::pin(async { Err(Error::InvalidResponseStatusCode(299)) })
        }

        let trace: Trace = Arc::default();
        let stack = recorders(&["a"], &trace);
        let result = execute(&stack, &mut ctx(), &failing).await;

        assert!(matches!(result, Err(Error::InvalidResponseStatusCode(299))));
        assert_eq!(*trace.lock(), ["a:before", "a:after"]);
    }

    #[tokio::test]
    async fn provided_state_reaches_the_endpoint() {
        let stack: Vec<BoxedMiddleware> = vec![Arc::new(Provider)];
        let response = execute(&stack, &mut ctx(), &echo_user).await.unwrap();
        assert_eq!(response.body, Some(Body::from("ann")));
    }

    #[test]
    fn contract_order_is_checked() {
        let consumer: BoxedMiddleware =
            Arc::new(typed(Contract::requires(&["user"]), from_fn("consumer", passthrough)));
        let provider: BoxedMiddleware = Arc::new(Provider);

        let good = [Arc::clone(&provider), Arc::clone(&consumer)];
        assert!(verify_contracts(&good, &[]).is_ok());

        let bad = [consumer, provider];
        assert!(matches!(
            verify_contracts(&bad, &[]),
            Err(Error::MissingState { middleware: "consumer", key: "user" })
        ));
    }

    #[test]
    fn seeded_keys_satisfy_requirements() {
        let consumer: BoxedMiddleware =
            Arc::new(typed(Contract::requires(&["requestId"]), from_fn("consumer", passthrough)));
        assert!(verify_contracts(&[consumer], &["requestId"]).is_ok());
    }
}
