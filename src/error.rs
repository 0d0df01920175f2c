//! Error taxonomy.
//!
//! Two families, per the framework's phase separation:
//!
//! - [`RegistrationError`] — assembly-time failures (duplicate or ambiguous
//!   routes, include conflicts, reserved environment keys). Always surfaced
//!   immediately from the registration call, never deferred to request time.
//! - [`HttpError`] — dispatch-time failures raised inside a handler chain.
//!   Carries a status code; non-HTTP failures convert into a 500-class
//!   `HttpError` carrying the error's string representation.

use std::sync::Arc;

use thiserror::Error;

use crate::http::StatusCode;
use crate::reply::Reply;

/// A dispatch-time error with an HTTP status.
///
/// Handlers and middleware return `Err(HttpError)` to short-circuit into the
/// owning route's captured error handler.
///
/// # Examples
///
/// ```
/// use seam::HttpError;
///
/// let err = HttpError::new(400u16, "missing form field 'test'");
/// assert_eq!(err.status().as_u16(), 400);
/// assert_eq!(err.to_string(), "missing form field 'test'");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// Creates an error with an explicit status code.
    pub fn new(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    /// A 500-class error from any displayable value.
    pub fn internal(message: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
        }
    }

    /// The error produced when no route pattern matches a path.
    pub fn not_found(path: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("no route matches {path}"),
        }
    }

    /// The error produced when a pattern matches but no entry allows the method.
    pub fn method_not_allowed(method: &str, path: &str) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: format!("method {method} not allowed for {path}"),
        }
    }

    /// Returns the HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::internal(err)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::internal(err)
    }
}

/// Short-circuits a handler with the given status and message.
///
/// ```
/// use seam::{abort, Context, Outcome};
///
/// async fn guarded(ctx: Context) -> Outcome {
///     if ctx.request().form().get("test").is_none() {
///         return abort(400, "missing form field 'test'");
///     }
///     seam::reply("ok")
/// }
/// ```
pub fn abort(status: u16, message: impl Into<String>) -> Result<Reply, HttpError> {
    Err(HttpError::new(status, message))
}

/// A scope- or route-level error handler.
///
/// Receives the raised [`HttpError`] and returns `Some(reply)` to convert it
/// into a response, or `None` to signal "I do not handle this" — in which
/// case the raw error propagates to the transport as an unhandled fault.
pub type ErrorHandler = Arc<dyn Fn(&HttpError) -> Option<Reply> + Send + Sync + 'static>;

/// Wraps a closure as an [`ErrorHandler`].
pub fn error_handler(
    f: impl Fn(&HttpError) -> Option<Reply> + Send + Sync + 'static,
) -> ErrorHandler {
    Arc::new(f)
}

/// The default error handler: the error's text with its status code.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err| Some(Reply::with_status(err.message(), err.status().as_u16())))
}

/// An error handler rendering `{"message": ..., "status_code": ...}` as JSON.
pub fn json_error_handler() -> ErrorHandler {
    Arc::new(|err| {
        let body = serde_json::json!({
            "message": err.message(),
            "status_code": err.status().as_u16(),
        });
        Some(Reply::with_status(body, err.status().as_u16()))
    })
}

/// Fatal errors raised during application assembly.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(
        "path \"{pattern}\" already exists in \"{scope}\" for an overlapping method set; \
         maybe you included routes with the same url?"
    )]
    DuplicateRoute { scope: String, pattern: String },

    #[error(
        "patterns \"{first}\" and \"{second}\" in \"{scope}\" are equally specific and can \
         match the same path"
    )]
    AmbiguousRoute {
        scope: String,
        first: String,
        second: String,
    },

    // The field cannot be called `source`: thiserror reserves that name for
    // the error-source chain.
    #[error(
        "path \"{pattern}\" already exists in \"{target}\"; \
         \"{from_scope}\" cannot be included in \"{target}\""
    )]
    IncludeConflict {
        from_scope: String,
        target: String,
        pattern: String,
    },

    #[error("key \"{key}\" is a reserved environment variable")]
    ReservedEnvKey { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_is_message() {
        let err = HttpError::new(404u16, "gone");
        assert_eq!(err.to_string(), "gone");
    }

    #[test]
    fn internal_defaults_to_500() {
        let err = HttpError::internal("boom");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn io_error_converts_to_500() {
        let io = std::io::Error::other("disk on fire");
        let err: HttpError = io.into();
        assert_eq!(err.status().as_u16(), 500);
        assert!(err.message().contains("disk on fire"));
    }

    #[test]
    fn default_handler_echoes_status_and_text() {
        let handler = default_error_handler();
        let reply = handler(&HttpError::new(404u16, "nope")).unwrap();
        let response = reply.into_response();
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(response.text(), "nope");
    }

    #[test]
    fn include_conflict_names_both_scopes() {
        let err = RegistrationError::IncludeConflict {
            from_scope: "api".to_owned(),
            target: "main".to_owned(),
            pattern: "/users".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "path \"/users\" already exists in \"main\"; \
             \"api\" cannot be included in \"main\""
        );
    }

    #[test]
    fn json_handler_renders_object() {
        let handler = json_error_handler();
        let reply = handler(&HttpError::new(400u16, "bad")).unwrap();
        let response = reply.into_response();
        let value: serde_json::Value = serde_json::from_slice(response.body_ref()).unwrap();
        assert_eq!(value["message"], "bad");
        assert_eq!(value["status_code"], 400);
    }
}
