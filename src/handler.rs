//! Handler trait and type erasure.
//!
//! A router holds handlers of many concrete types in one ordered list, so
//! each (validator, handler) pair is hidden behind a common trait object:
//!
//! ```text
//! async fn show(id: u64, ctx: Context) -> Json<Item> { … }   ← user writes this
//!        ↓ router.on(Method::Get, "/items/:id", numeric_id, show)
//! show.into_boxed_handler(numeric_id)                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler { validator, handler })                ← stored as BoxedHandler
//!        ↓
//! handler.call(request, ctx)  at request time               ← one vtable dispatch
//! ```
//!
//! Validation runs synchronously inside `call`; a rejected request never
//! reaches the handler and resolves to [`Error::Validation`].

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::pipeline::BoxFuture;
use crate::request::Request;
use crate::response::{IntoOutcome, Outcome};
use crate::validate::Validator;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the return type of the public
/// [`Handler::into_boxed_handler`].
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, Outcome>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every function usable as a route handler behind validator `V`.
///
/// Satisfied automatically by any
///
/// ```text
/// async fn name(input: V::Output, ctx: Context) -> impl IntoOutcome
/// ```
///
/// The trait is sealed; only the blanket impl below provides it.
pub trait Handler<V: Validator>: private::Sealed<V> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self, validator: V) -> BoxedHandler;
}

mod private {
    pub trait Sealed<V> {}
}

impl<V, F, Fut, R> private::Sealed<V> for F
where
    V: Validator,
    F: Fn(V::Output, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<V, F, Fut, R> Handler<V> for F
where
    V: Validator,
    F: Fn(V::Output, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self, validator: V) -> BoxedHandler {
        Arc::new(FnHandler { validator, handler: self })
    }
}

struct FnHandler<V, F> {
    validator: V,
    handler: F,
}

impl<V, F, Fut, R> ErasedHandler for FnHandler<V, F>
where
    V: Validator,
    F: Fn(V::Output, Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, Outcome> {
        match self.validator.validate(request) {
            Ok(input) => {
                let fut = (self.handler)(input, ctx);
                Box::pin(async move { fut.await.into_outcome() })
            }
            Err(issues) => Box::pin(std::future::ready(Err(Error::Validation(issues)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::method::Method;
    use crate::response::Response;
    use crate::validate::{Location, Unvalidated, ValidationError};

    async fn echo_path(req: Request, _ctx: Context) -> String {
        req.path
    }

    fn even(req: Request) -> Result<u64, ValidationError> {
        req.query("n")
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| n % 2 == 0)
            .ok_or_else(|| ValidationError::new().with_issue(Location::Query, ["n"], "must be even"))
    }

    async fn half(n: u64, _ctx: Context) -> Response {
        Response::text((n / 2).to_string())
    }

    #[tokio::test]
    async fn unvalidated_handler_sees_the_request() {
        let handler = echo_path.into_boxed_handler(Unvalidated);
        let req = Request::new(Method::Get, "/hello");
        let response = handler.call(req.clone(), Context::new(req)).await.unwrap();
        assert_eq!(response.body, Some(Body::from("/hello")));
    }

    #[tokio::test]
    async fn rejected_requests_never_reach_the_handler() {
        let handler = half.into_boxed_handler(even);

        let odd = Request::new(Method::Get, "/").with_query("n", "3");
        let err = handler.call(odd.clone(), Context::new(odd)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.query.len() == 1));

        let four = Request::new(Method::Get, "/").with_query("n", "4");
        let response = handler.call(four.clone(), Context::new(four)).await.unwrap();
        assert_eq!(response.body, Some(Body::from("2")));
    }
}
