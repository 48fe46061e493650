//! Path-conditional middleware.
//!
//! [`scoped`] applies a middleware only to paths matching one of the given
//! patterns; [`except`] applies it everywhere else. A skipped request still
//! continues down the pipeline. Patterns use the [`PathMatcher`] grammar and
//! are matched against the application-relative path.
//!
//! Only middleware with an empty state contract can be wrapped: skipping a
//! provider would leave its declared keys missing for everything downstream.

use crate::context::Context;
use crate::error::Error;
use crate::path::PathMatcher;
use crate::pipeline::{BoxFuture, Contract, Middleware, Next};
use crate::response::Outcome;

#[derive(Debug)]
pub struct Scoped<M> {
    patterns: Vec<PathMatcher>,
    inner: M,
    inside: bool,
}

pub fn scoped<M, I, S>(patterns: I, middleware: M) -> Result<Scoped<M>, Error>
where
    M: Middleware,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Scoped::new(patterns, middleware, true)
}

pub fn except<M, I, S>(patterns: I, middleware: M) -> Result<Scoped<M>, Error>
where
    M: Middleware,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Scoped::new(patterns, middleware, false)
}

impl<M: Middleware> Scoped<M> {
    fn new<I, S>(patterns: I, inner: M, inside: bool) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !inner.contract().is_empty() {
            return Err(Error::ScopedStateContract { middleware: inner.name() });
        }
        let patterns = patterns.into_iter().map(|p| PathMatcher::new(p.as_ref())).collect();
        Ok(Self { patterns, inner, inside })
    }

    fn applies(&self, path: &str) -> bool {
        self.patterns.iter().any(|m| m.matches(path)) == self.inside
    }
}

impl<M: Middleware> Middleware for Scoped<M> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        if self.applies(&ctx.request.path) {
            self.inner.call(ctx, next)
        } else {
            Box::pin(async move { next.run(ctx).await })
        }
    }
}
