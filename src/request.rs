//! Canonical request type.

use std::collections::HashMap;

use crate::body::{Body, Fields, Headers, OneOrMany, append};
use crate::method::Method;

/// A request in host-independent form.
///
/// Header and query maps are `None` when empty rather than empty maps;
/// lookups treat both the same. Header names are lowercase. `param` is only
/// ever filled in by the router after a path match.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub header: Option<Headers>,
    pub query: Option<Fields<String>>,
    pub param: Option<HashMap<String, String>>,
    pub body: Option<Body>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            header: None,
            query: None,
            param: None,
            body: None,
        }
    }

    /// Adds a header value. The name is lowercased; repeats become a list.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let header = self.header.get_or_insert_with(HashMap::new);
        append(header, name.to_ascii_lowercase(), value.into());
        self
    }

    /// Adds a query value. The key is lowercased; repeats become a list.
    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        let query = self.query.get_or_insert_with(HashMap::new);
        append(query, key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup; returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name)?.first().map(String::as_str)
    }

    pub fn header_values(&self, name: &str) -> Option<&OneOrMany<String>> {
        let header = self.header.as_ref()?;
        header
            .get(name)
            .or_else(|| header.get(&name.to_ascii_lowercase()))
    }

    /// Returns the first value of a query parameter. Keys are case-insensitive.
    pub fn query(&self, key: &str) -> Option<&str> {
        let query = self.query.as_ref()?;
        query
            .get(key)
            .or_else(|| query.get(&key.to_ascii_lowercase()))?
            .first()
            .map(String::as_str)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.param.as_ref()?.get(key).map(String::as_str)
    }
}
