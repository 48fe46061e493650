//! Per-request context.

use crate::request::Request;
use crate::state::State;

/// The request being processed plus the state middleware have attached to it.
///
/// Created fresh for every inbound request and dropped once the response is
/// produced. Never shared between requests.
#[derive(Clone, Debug)]
pub struct Context {
    pub request: Request,
    pub state: State,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request, state: State::new() }
    }
}
