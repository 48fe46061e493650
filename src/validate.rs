//! Route validators.
//!
//! A route's validator turns the canonical [`Request`] into whatever its
//! handler consumes, or rejects it with a [`ValidationError`] listing what
//! was wrong and where. The router never catches the error; it reaches the
//! application boundary and becomes a `400` with the issues attached.

use serde::Serialize;

use crate::request::Request;

/// Where in the request an issue was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Body,
    Query,
    Header,
    Param,
}

/// One problem with one field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Path to the offending field, outermost key first.
    pub path: Vec<String>,
    pub message: String,
}

/// Per-location issue lists.
///
/// Serialises as `{"query": [{"path": [...], "message": "..."}], ...}`,
/// omitting locations without issues.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("request validation failed")]
pub struct ValidationError {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub param: Vec<Issue>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`push`](ValidationError::push).
    pub fn with_issue<P, S>(mut self, location: Location, path: P, message: impl Into<String>) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(location, path, message);
        self
    }

    pub fn push<P, S>(&mut self, location: Location, path: P, message: impl Into<String>)
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let issue = Issue {
            path: path.into_iter().map(Into::into).collect(),
            message: message.into(),
        };
        self.issues_mut(location).push(issue);
    }

    pub fn issues(&self, location: Location) -> &[Issue] {
        match location {
            Location::Body => &self.body,
            Location::Query => &self.query,
            Location::Header => &self.header,
            Location::Param => &self.param,
        }
    }

    fn issues_mut(&mut self, location: Location) -> &mut Vec<Issue> {
        match location {
            Location::Body => &mut self.body,
            Location::Query => &mut self.query,
            Location::Header => &mut self.header,
            Location::Param => &mut self.param,
        }
    }

    /// Total number of issues across all locations.
    pub fn len(&self) -> usize {
        self.body.len() + self.query.len() + self.header.len() + self.param.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The non-failing result of [`Validator::safe_validate`].
#[derive(Debug)]
pub enum Validation<T> {
    Valid(T),
    Invalid(ValidationError),
}

impl<T> Validation<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn into_result(self) -> Result<T, ValidationError> {
        match self {
            Self::Valid(data) => Ok(data),
            Self::Invalid(error) => Err(error),
        }
    }
}

/// Checks a request before its handler sees it.
///
/// Implemented for any `Fn(Request) -> Result<T, ValidationError>`:
///
/// ```rust,ignore
/// fn page(req: Request) -> Result<u32, ValidationError> {
///     req.query("page").unwrap_or("1").parse().map_err(|_| {
///         ValidationError::new().with_issue(Location::Query, ["page"], "must be a number")
///     })
/// }
///
/// Router::new().on(Method::Get, "/items", page, list_items);
/// ```
pub trait Validator: Send + Sync + 'static {
    type Output: Send + 'static;

    fn validate(&self, request: Request) -> Result<Self::Output, ValidationError>;

    fn safe_validate(&self, request: Request) -> Validation<Self::Output> {
        match self.validate(request) {
            Ok(data) => Validation::Valid(data),
            Err(error) => Validation::Invalid(error),
        }
    }
}

impl<F, T> Validator for F
where
    F: Fn(Request) -> Result<T, ValidationError> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn validate(&self, request: Request) -> Result<T, ValidationError> {
        self(request)
    }
}

/// Accepts every request and hands it to the handler unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unvalidated;

impl Validator for Unvalidated {
    type Output = Request;

    fn validate(&self, request: Request) -> Result<Request, ValidationError> {
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    fn numeric_id(req: Request) -> Result<u64, ValidationError> {
        req.param("id").and_then(|id| id.parse().ok()).ok_or_else(|| {
            ValidationError::new().with_issue(Location::Param, ["id"], "must be an integer")
        })
    }

    #[test]
    fn safe_validate_reports_instead_of_failing() {
        let mut req = Request::new(Method::Get, "/items/x");
        req.param = Some([("id".to_owned(), "x".to_owned())].into());

        let outcome = numeric_id.safe_validate(req.clone());
        assert!(!outcome.is_valid());
        let error = outcome.into_result().unwrap_err();
        assert_eq!(error.issues(Location::Param)[0].path, ["id"]);

        req.param = Some([("id".to_owned(), "42".to_owned())].into());
        assert_eq!(numeric_id.validate(req).unwrap(), 42);
    }

    #[test]
    fn empty_locations_are_not_serialised() {
        let error = ValidationError::new().with_issue(Location::Body, ["user", "email"], "required");
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value, serde_json::json!({
            "body": [{ "path": ["user", "email"], "message": "required" }]
        }));
        assert_eq!(error.len(), 1);
    }

    #[test]
    fn unvalidated_passes_through() {
        let req = Request::new(Method::Post, "/").with_body("hi");
        assert_eq!(Unvalidated.validate(req.clone()).unwrap(), req);
    }
}
