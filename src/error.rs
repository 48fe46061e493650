//! Unified error type.
//!
//! Every fallible boundary in pipework returns [`Error`]. Middleware and
//! handlers propagate it with `?`; the application turns whatever reaches it
//! into a response (see [`Error::into_response`]).

use serde_json::json;

use crate::response::Response;
use crate::validate::ValidationError;

/// A boxed error from user code or a transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by pipework's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A JSON, form or multipart body could not be parsed.
    #[error("failed to parse {content_type} body: {source}")]
    BodyParse {
        content_type: &'static str,
        #[source]
        source: BoxError,
    },

    /// The declared or measured body size exceeds the configured limit.
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// A route validator rejected the request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid query string: {0}")]
    Query(#[source] serde_urlencoded::de::Error),

    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),

    /// A response carried a status code with no definition.
    #[error("no response definition for status code {0}")]
    InvalidResponseStatusCode(u16),

    #[error("invalid response header `{0}`")]
    InvalidHeader(String),

    #[error("next() called multiple times in middleware `{middleware}`")]
    NextCalledTwice { middleware: &'static str },

    #[error("middleware `{middleware}` requires state `{key}` that no earlier middleware provides")]
    MissingState { middleware: &'static str, key: &'static str },

    #[error("middleware `{middleware}` declares a state contract and cannot be scoped")]
    ScopedStateContract { middleware: &'static str },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The transport failed while the request body was being read.
    #[error("failed to read request body: {0}")]
    Body(#[source] BoxError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Anything a handler or middleware raised on its own account.
    #[error("{0}")]
    Handler(BoxError),
}

impl Error {
    /// Wraps an arbitrary error raised by application code.
    pub fn other(error: impl Into<BoxError>) -> Self {
        Self::Handler(error.into())
    }

    pub(crate) fn body_parse(content_type: &'static str, error: impl Into<BoxError>) -> Self {
        Self::BodyParse { content_type, source: error.into() }
    }

    /// The HTTP status this error maps to at the application boundary.
    ///
    /// Client faults map to 4xx; contract and programming errors map to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BodyParse { .. } | Self::Query(_) | Self::Validation(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::UnsupportedMethod(_) => 405,
            _ => 500,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BodyParse { .. } => "body_parse_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Validation(_) => "validation_error",
            Self::Query(_) => "invalid_query",
            Self::UnsupportedMethod(_) => "method_not_allowed",
            _ => "internal_error",
        }
    }

    /// Renders the JSON error envelope.
    ///
    /// Server errors never leak their message; the detail goes to the log.
    pub fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status >= 500 {
            "Internal Server Error".to_owned()
        } else {
            self.to_string()
        };
        let mut body = json!({ "error": self.kind(), "message": message });

        if let Some(fields) = body.as_object_mut() {
            match self {
                Self::Validation(issues) => {
                    fields.insert("issues".to_owned(), serde_json::to_value(issues).unwrap_or_default());
                }
                Self::PayloadTooLarge { size, limit } => {
                    fields.insert("size".to_owned(), size.into());
                    fields.insert("limit".to_owned(), limit.into());
                }
                _ => {}
            }
        }

        Response::json(body).with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::validate::Location;

    #[test]
    fn client_faults_map_to_4xx() {
        assert_eq!(Error::PayloadTooLarge { size: 2, limit: 1 }.status_code(), 413);
        assert_eq!(Error::UnsupportedMethod("BREW".into()).status_code(), 405);
        assert_eq!(Error::Validation(ValidationError::new()).status_code(), 400);
        assert_eq!(Error::body_parse("application/json", "eof").status_code(), 400);
    }

    #[test]
    fn contract_errors_map_to_500() {
        assert_eq!(Error::InvalidResponseStatusCode(299).status_code(), 500);
        assert_eq!(Error::NextCalledTwice { middleware: "m" }.status_code(), 500);
        assert_eq!(Error::other("boom").status_code(), 500);
    }

    #[test]
    fn server_errors_hide_their_message() {
        let response = Error::other("database password is hunter2").into_response();
        assert_eq!(response.status_code, 500);
        let Some(Body::Json(body)) = response.body else { panic!("expected json body") };
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[test]
    fn validation_envelope_carries_issues() {
        let issues = ValidationError::new().with_issue(Location::Query, ["limit"], "must be a number");
        let response = Error::Validation(issues).into_response();
        let Some(Body::Json(body)) = response.body else { panic!("expected json body") };
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["issues"]["query"][0]["path"][0], "limit");
        assert_eq!(body["issues"]["query"][0]["message"], "must be a number");
    }

    #[test]
    fn payload_envelope_carries_sizes() {
        let response = Error::PayloadTooLarge { size: 101, limit: 100 }.into_response();
        assert_eq!(response.status_code, 413);
        let Some(Body::Json(body)) = response.body else { panic!("expected json body") };
        assert_eq!(body["size"], 101);
        assert_eq!(body["limit"], 100);
    }
}
