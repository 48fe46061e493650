//! Canonical response type and the conversions handlers return through.
//!
//! Build a [`Response`] in your handler and return it, or return anything
//! that implements [`IntoOutcome`]: strings, `serde_json::Value`, [`Json`],
//! or a `Result` of any of those.

use serde::Serialize;

use crate::body::{Body, Headers, OneOrMany, append};
use crate::error::Error;

/// What a middleware, endpoint or handler produces.
pub type Outcome = Result<Response, Error>;

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing response in host-independent form.
///
/// ```rust
/// use pipework::Response;
/// use serde_json::json;
///
/// Response::json(json!({ "id": 1 }));
/// Response::text("hello");
/// Response::new(204);
///
/// Response::new(201)
///     .with_header("location", "/users/42")
///     .with_body(json!({ "id": 42 }));
/// ```
///
/// A structured body gets `content-type: application/json` when it is
/// serialised, unless a content type was set explicitly.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub header: Option<Headers>,
    pub body: Option<Body>,
}

impl Response {
    /// Response with the given status and no body.
    pub fn new(status_code: u16) -> Self {
        Self { status_code, header: None, body: None }
    }

    /// `200 OK` with a JSON body.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(200).with_body(value)
    }

    /// `200 OK` with a `text/plain; charset=utf-8` body.
    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(200)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    pub fn not_found() -> Self {
        Self::new(404).with_body(serde_json::json!({ "error": "not_found", "message": "Not Found" }))
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Replaces any existing value of the header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive lookup of the header's values.
    pub fn header_values(&self, name: &str) -> Option<&OneOrMany<String>> {
        self.header
            .as_ref()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name)?.first().map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header_values(name).is_some()
    }

    /// Sets a header, replacing every existing spelling of its name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let header = self.header.get_or_insert_with(Headers::new);
        header.retain(|key, _| !key.eq_ignore_ascii_case(name));
        header.insert(name.to_ascii_lowercase(), OneOrMany::One(value.into()));
    }

    /// Adds a header value next to any existing ones.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        let header = self.header.get_or_insert_with(Headers::new);
        let key = header
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_ascii_lowercase());
        append(header, key, value.into());
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

/// Conversion into a [`Response`] that cannot fail.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Response { Response::json(self) }
}

/// Anything a handler may return.
///
/// Errors inside a `Result` propagate through the middleware stack to the
/// application boundary.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

macro_rules! infallible_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                fn into_outcome(self) -> Outcome {
                    Ok(self.into_response())
                }
            }
        )*
    };
}

infallible_outcome!(Response, &'static str, String, serde_json::Value);

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoResponse,
    E: Into<Error>,
{
    fn into_outcome(self) -> Outcome {
        self.map(IntoResponse::into_response).map_err(Into::into)
    }
}

/// A `200 OK` JSON response built from any serialisable value.
///
/// ```rust,ignore
/// async fn get_user(req: Request, _ctx: Context) -> Json<User> {
///     Json(User { id: 1, name: "alice".into() })
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoOutcome for Json<T> {
    fn into_outcome(self) -> Outcome {
        let value = serde_json::to_value(self.0).map_err(Error::other)?;
        Ok(Response::json(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_header_replaces_other_spellings() {
        let mut response = Response::new(200);
        response.header = Some(Headers::from([(
            "Content-Type".to_owned(),
            OneOrMany::from("text/html"),
        )]));
        response.set_header("content-type", "text/plain");

        assert_eq!(response.header.as_ref().unwrap().len(), 1);
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn append_header_builds_a_list() {
        let mut response = Response::new(200);
        response.append_header("Set-Cookie", "a=1");
        response.append_header("set-cookie", "b=2");
        assert_eq!(response.header_values("set-cookie").unwrap().len(), 2);
    }

    #[test]
    fn result_errors_propagate() {
        let ok: Result<&'static str, Error> = Ok("fine");
        assert_eq!(ok.into_outcome().unwrap().status_code, 200);

        let err: Result<Response, Error> = Err(Error::AlreadyRunning);
        assert!(matches!(err.into_outcome(), Err(Error::AlreadyRunning)));
    }

    #[test]
    fn json_wrapper_serialises() {
        #[derive(Serialize)]
        struct User { id: u32 }

        let response = Json(User { id: 7 }).into_outcome().unwrap();
        assert_eq!(response.body, Some(Body::Json(json!({ "id": 7 }))));
    }
}
