//! Handler return shapes and their normalization into a [`Response`].
//!
//! Handlers may produce a bare body, a `(body, code)` pair, a
//! `(body, code, headers)` triple, or an already-built [`Response`]. [`Reply`]
//! models these four shapes as a tagged union with one normalization
//! function, [`Reply::into_response`], which is total over all of them —
//! unspecified fields default to code 200 and empty headers. A value that is
//! none of these shapes cannot be constructed, so shape errors are impossible
//! by the time dispatch runs.

use bytes::Bytes;
use serde_json::Value;

use crate::error::HttpError;
use crate::http::{Headers, Response, StatusCode};

/// The result every handler resolves to.
pub type Outcome = Result<Reply, HttpError>;

/// A response body: text, raw bytes, a JSON value, or nothing.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Text(String),
    Bytes(Bytes),
    Json(Value),
}

/// One of the accepted handler return shapes.
///
/// # Examples
///
/// ```
/// use seam::Reply;
///
/// let response = Reply::with_status("created", 201).into_response();
/// assert_eq!(response.status().as_u16(), 201);
/// assert_eq!(response.text(), "created");
/// ```
#[derive(Debug, Clone)]
pub enum Reply {
    /// A bare body; status defaults to 200, headers to empty.
    Body(Body),
    /// A body with an explicit status code.
    WithStatus(Body, u16),
    /// Body, status code, and headers.
    Full(Body, u16, Headers),
    /// An already-built response, passed through unchanged.
    Response(Response),
}

impl Reply {
    /// A bare-body reply.
    pub fn body(body: impl IntoBody) -> Self {
        Reply::Body(body.into_body())
    }

    /// A `(body, code)` reply.
    pub fn with_status(body: impl IntoBody, code: u16) -> Self {
        Reply::WithStatus(body.into_body(), code)
    }

    /// A `(body, code, headers)` reply.
    pub fn full(body: impl IntoBody, code: u16, headers: Headers) -> Self {
        Reply::Full(body.into_body(), code, headers)
    }

    /// Adds a header, upgrading the shape to `Full` when needed.
    #[must_use]
    pub fn with_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        match self {
            Reply::Body(body) => {
                let mut headers = Headers::new();
                headers.insert(name, value);
                Reply::Full(body, 200, headers)
            }
            Reply::WithStatus(body, code) => {
                let mut headers = Headers::new();
                headers.insert(name, value);
                Reply::Full(body, code, headers)
            }
            Reply::Full(body, code, mut headers) => {
                headers.insert(name, value);
                Reply::Full(body, code, headers)
            }
            Reply::Response(mut response) => {
                response.add_header(name, value);
                Reply::Response(response)
            }
        }
    }

    /// Replaces the body, keeping status and headers.
    #[must_use]
    pub fn map_body(self, f: impl FnOnce(Body) -> Body) -> Self {
        match self {
            Reply::Body(body) => Reply::Body(f(body)),
            Reply::WithStatus(body, code) => Reply::WithStatus(f(body), code),
            Reply::Full(body, code, headers) => Reply::Full(f(body), code, headers),
            other @ Reply::Response(_) => other,
        }
    }

    /// Normalizes this reply into a [`Response`].
    ///
    /// Total over all shapes: defaults are code 200 and empty headers. A JSON
    /// body sets `Content-Type: application/json` unless the headers already
    /// name one.
    pub fn into_response(self) -> Response {
        match self {
            Reply::Body(body) => finish(body, 200, Headers::new()),
            Reply::WithStatus(body, code) => finish(body, code, Headers::new()),
            Reply::Full(body, code, headers) => finish(body, code, headers),
            Reply::Response(response) => response,
        }
    }
}

fn finish(body: Body, code: u16, mut headers: Headers) -> Response {
    let is_json = matches!(body, Body::Json(_));
    if is_json && !headers.contains("content-type") {
        headers.insert("Content-Type", "application/json");
    }

    let mut response = Response::new(StatusCode::from_u16(code));
    for (name, value) in headers.iter() {
        response.add_header(name, value);
    }
    match body {
        Body::Empty => response,
        Body::Text(text) => response.body(text),
        Body::Bytes(bytes) => response.body_bytes(bytes),
        Body::Json(value) => response.body(value.to_string()),
    }
}

/// Conversion into a [`Body`].
pub trait IntoBody {
    fn into_body(self) -> Body;
}

impl IntoBody for () {
    fn into_body(self) -> Body {
        Body::Empty
    }
}

impl IntoBody for &str {
    fn into_body(self) -> Body {
        Body::Text(self.to_owned())
    }
}

impl IntoBody for String {
    fn into_body(self) -> Body {
        Body::Text(self)
    }
}

impl IntoBody for Vec<u8> {
    fn into_body(self) -> Body {
        Body::Bytes(Bytes::from(self))
    }
}

impl IntoBody for Bytes {
    fn into_body(self) -> Body {
        Body::Bytes(self)
    }
}

impl IntoBody for Value {
    fn into_body(self) -> Body {
        Body::Json(self)
    }
}

impl IntoBody for Body {
    fn into_body(self) -> Body {
        self
    }
}

/// Conversion into a [`Reply`]. Implemented for every accepted handler
/// return shape.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply {
        Reply::Response(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::Body(Body::Empty)
    }
}

impl IntoReply for &str {
    fn into_reply(self) -> Reply {
        Reply::Body(self.into_body())
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply {
        Reply::Body(self.into_body())
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Reply {
        Reply::Body(self.into_body())
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Reply {
        Reply::Body(self.into_body())
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply {
        Reply::Body(self.into_body())
    }
}

impl<B: IntoBody> IntoReply for (B, u16) {
    fn into_reply(self) -> Reply {
        Reply::WithStatus(self.0.into_body(), self.1)
    }
}

impl<B: IntoBody> IntoReply for (B, u16, Headers) {
    fn into_reply(self) -> Reply {
        Reply::Full(self.0.into_body(), self.1, self.2)
    }
}

/// Wraps any reply shape in `Ok`, the usual last line of a handler.
///
/// ```
/// use seam::{reply, Context, Outcome};
///
/// async fn hello(_ctx: Context) -> Outcome {
///     reply("hi")
/// }
/// ```
pub fn reply(value: impl IntoReply) -> Outcome {
    Ok(value.into_reply())
}

/// A redirect reply: HTML body, `Location` header, and the given 3xx code.
pub fn redirect(location: &str, code: u16) -> Reply {
    let body = format!(
        "<!DOCTYPE HTML>\n<title>Redirecting...</title>\n<h1>Redirecting...</h1>\n\
         <p>You should be redirected automatically to target URL: \
         <a href=\"{location}\">{location}</a>. If not click the link.",
    );
    let headers: Headers = [
        ("Location", location),
        ("Content-Type", "text/html"),
    ]
    .into_iter()
    .collect();
    Reply::Full(Body::Text(body), code, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_body_defaults() {
        let response = Reply::body("hi").into_response();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text(), "hi");
        assert!(response.headers().is_empty());
    }

    #[test]
    fn body_with_code() {
        let response = ("made", 201u16).into_reply().into_response();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.text(), "made");
    }

    #[test]
    fn full_shape() {
        let headers: Headers = [("X-Extra", "1")].into_iter().collect();
        let response = ("no", 403u16, headers).into_reply().into_response();
        assert_eq!(response.status().as_u16(), 403);
        assert_eq!(response.headers().get("x-extra"), Some("1"));
    }

    #[test]
    fn prebuilt_response_passes_through() {
        let original = Response::new(StatusCode::ACCEPTED).body("queued");
        let response = original.into_reply().into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.text(), "queued");
    }

    #[test]
    fn json_body_sets_content_type() {
        let response = Reply::body(serde_json::json!({"ok": true})).into_response();
        assert_eq!(response.headers().get("content-type"), Some("application/json"));
        assert_eq!(response.text(), r#"{"ok":true}"#);
    }

    #[test]
    fn json_content_type_not_duplicated() {
        let headers: Headers = [("Content-Type", "application/json; charset=utf-8")]
            .into_iter()
            .collect();
        let response = Reply::full(serde_json::json!(1), 200, headers).into_response();
        let all: Vec<_> = response.headers().get_all("content-type").collect();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn with_header_upgrades_shape() {
        let response = Reply::body("x").with_header("X-A", "b").into_response();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers().get("x-a"), Some("b"));
    }

    #[test]
    fn empty_body() {
        let response = ().into_reply().into_response();
        assert!(response.body_ref().is_empty());
        assert_eq!(response.status().as_u16(), 200);
    }

    #[test]
    fn redirect_reply() {
        let response = redirect("https://example.com", 301).into_response();
        assert_eq!(response.status().as_u16(), 301);
        assert_eq!(response.headers().get("location"), Some("https://example.com"));
        assert!(response.text().contains("Redirecting"));
    }
}
