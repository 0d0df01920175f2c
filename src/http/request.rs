//! HTTP/1.1 request parsing using the [`httparse`] crate, plus the accessors
//! the dispatch engine and handlers rely on: query parameters, cookies, form
//! fields, and multipart file uploads.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A file received in a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Form field name the file was submitted under.
    pub name: String,
    /// Client-supplied file name.
    pub filename: String,
    /// Part `Content-Type`, if the client sent one.
    pub content_type: Option<String>,
    /// Raw file contents.
    pub data: Bytes,
}

/// A fully parsed inbound HTTP request.
///
/// One `Request` exists per inbound call and is exclusively owned by the
/// dispatch of that call. Created by [`Request::parse`] from a raw byte
/// buffer, or by [`Request::builder`] for in-process tests.
///
/// # Examples
///
/// ```
/// use seam::http::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    query_params: HashMap<String, String>,
    body: Bytes,
    peer: Option<SocketAddr>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
            .unwrap(); // Infallible

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.find('?') {
            Some(pos) => (
                raw_path[..pos].to_owned(),
                Some(raw_path[pos + 1..].to_owned()),
            ),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let query_params = query.as_deref().map(parse_pairs).unwrap_or_default();
        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                query_params,
                body,
                peer: None,
            },
            body_offset,
        ))
    }

    /// Starts building a request programmatically (used by the test client).
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path.into())
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Returns the client socket address, when the transport supplied one.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Records the client socket address. Called by the transport adapter.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Returns the value of the named cookie from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Parses the `Cookie` header into a name → value map.
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for header in self.headers.get_all("cookie") {
            for pair in header.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    out.insert(name.to_owned(), value.to_owned());
                }
            }
        }
        out
    }

    /// Returns the form fields of the request body.
    ///
    /// Supports `application/x-www-form-urlencoded` and the field parts of
    /// `multipart/form-data`. Any other content type yields an empty map.
    pub fn form(&self) -> HashMap<String, String> {
        match self.content_type() {
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                match str::from_utf8(&self.body) {
                    Ok(text) => parse_pairs(text),
                    Err(_) => HashMap::new(),
                }
            }
            Some(ct) if ct.starts_with("multipart/form-data") => {
                let Some(boundary) = boundary_of(ct) else {
                    return HashMap::new();
                };
                multipart::parse(&self.body, boundary)
                    .fields
                    .into_iter()
                    .collect()
            }
            _ => HashMap::new(),
        }
    }

    /// Returns the uploaded files of a `multipart/form-data` body.
    pub fn files(&self) -> Vec<UploadedFile> {
        match self.content_type() {
            Some(ct) if ct.starts_with("multipart/form-data") => match boundary_of(ct) {
                Some(boundary) => multipart::parse(&self.body, boundary).files,
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1, // HTTP/1.1 default: keep-alive
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Builder for constructing a [`Request`] without going through the wire
/// parser. The test client uses this; transports never do.
pub struct RequestBuilder {
    method: Method,
    path: String,
    headers: Headers,
    body: Bytes,
}

impl RequestBuilder {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a `Cookie` header entry.
    #[must_use]
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.headers.insert("Cookie", format!("{name}={value}"));
        self
    }

    /// Sets the raw request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets an `application/x-www-form-urlencoded` body from field pairs.
    #[must_use]
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k.replace(' ', "+"), v.replace(' ', "+")))
            .collect();
        self.headers
            .set("Content-Type", "application/x-www-form-urlencoded");
        self.body = Bytes::from(encoded.join("&"));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.headers.set("Content-Type", "application/json");
        self.body = Bytes::from(value.to_string());
        self
    }

    /// Finalizes the request, splitting the query string out of the path.
    pub fn build(self) -> Request {
        let (path, query) = match self.path.find('?') {
            Some(pos) => (
                self.path[..pos].to_owned(),
                Some(self.path[pos + 1..].to_owned()),
            ),
            None => (self.path, None),
        };
        let query_params = query.as_deref().map(parse_pairs).unwrap_or_default();
        Request {
            method: self.method,
            path,
            version: 1,
            headers: self.headers,
            query,
            query_params,
            body: self.body,
            peer: None,
        }
    }
}

/// Parses `key=value&key2=value2` pairs into a `HashMap`.
///
/// Keys and values have `+` decoded as a space. Full percent-decoding is
/// intentionally omitted here.
fn parse_pairs(text: &str) -> HashMap<String, String> {
    text.split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.replace('+', " ");
            let value = parts.next().unwrap_or("").replace('+', " ");
            Some((key, value))
        })
        .collect()
}

/// Extracts the boundary token from a `multipart/form-data` content type.
fn boundary_of(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("boundary=")
            .map(|b| b.trim_matches('"'))
    })
}

mod multipart {
    //! Minimal `multipart/form-data` body parser — enough for form fields and
    //! file uploads; nested multipart and transfer encodings are not handled.

    use std::collections::HashMap;

    use bytes::Bytes;

    use super::UploadedFile;

    #[derive(Default)]
    pub(super) struct Parts {
        pub fields: HashMap<String, String>,
        pub files: Vec<UploadedFile>,
    }

    pub(super) fn parse(body: &[u8], boundary: &str) -> Parts {
        let marker = format!("--{boundary}");
        let mut parts = Parts::default();

        for raw in split_parts(body, marker.as_bytes()) {
            let Some(header_end) = find(raw, b"\r\n\r\n") else {
                continue;
            };
            let Ok(header_text) = std::str::from_utf8(&raw[..header_end]) else {
                continue;
            };
            let content = &raw[header_end + 4..];

            let mut name = None;
            let mut filename = None;
            let mut content_type = None;
            for line in header_text.split("\r\n") {
                if let Some(rest) = strip_header(line, "content-disposition") {
                    name = param_of(rest, "name");
                    filename = param_of(rest, "filename");
                } else if let Some(rest) = strip_header(line, "content-type") {
                    content_type = Some(rest.trim().to_owned());
                }
            }

            let Some(name) = name else { continue };
            match filename {
                Some(filename) => parts.files.push(UploadedFile {
                    name,
                    filename,
                    content_type,
                    data: Bytes::copy_from_slice(content),
                }),
                None => {
                    let value = String::from_utf8_lossy(content).into_owned();
                    parts.fields.insert(name, value);
                }
            }
        }

        parts
    }

    // Yields the content of each part between boundary markers, with the
    // leading CRLF after the marker and the trailing CRLF before the next
    // marker stripped.
    fn split_parts<'a>(body: &'a [u8], marker: &[u8]) -> Vec<&'a [u8]> {
        let mut out = Vec::new();
        let mut rest = body;
        // Skip any preamble before the first marker.
        let Some(start) = find(rest, marker) else {
            return out;
        };
        rest = &rest[start + marker.len()..];

        loop {
            // `--` directly after the marker terminates the body.
            if rest.starts_with(b"--") {
                break;
            }
            let part_start = if rest.starts_with(b"\r\n") { 2 } else { 0 };
            let rest_body = &rest[part_start..];
            let Some(end) = find(rest_body, marker) else {
                break;
            };
            let mut part = &rest_body[..end];
            if part.ends_with(b"\r\n") {
                part = &part[..part.len() - 2];
            }
            out.push(part);
            rest = &rest_body[end + marker.len()..];
        }
        out
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn strip_header<'a>(line: &'a str, name: &str) -> Option<&'a str> {
        let (header, rest) = line.split_once(':')?;
        header
            .trim()
            .eq_ignore_ascii_case(name)
            .then(|| rest.trim())
    }

    fn param_of(header: &str, name: &str) -> Option<String> {
        header.split(';').find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            (key == name).then(|| value.trim_matches('"').to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn parse_query_params() {
        let raw = b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust&page=2"));
        assert_eq!(req.query_param("q"), Some("rust"));
        assert_eq!(req.query_param("page"), Some("2"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn cookies_parsed_from_header() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nCookie: a=1; session_id=abc\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.cookie("a"), Some("1".into()));
        assert_eq!(req.cookie("session_id"), Some("abc".into()));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn urlencoded_form() {
        let raw = b"POST /create HTTP/1.1\r\nHost: localhost\r\n\
            Content-Type: application/x-www-form-urlencoded\r\nContent-Length: 19\r\n\r\n\
            test=something+else";
        let (req, _) = Request::parse(raw).unwrap();
        let form = req.form();
        assert_eq!(form.get("test").map(String::as_str), Some("something else"));
    }

    #[test]
    fn form_empty_without_body() {
        let raw = b"POST /create HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.form().is_empty());
    }

    #[test]
    fn multipart_fields_and_files() {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"test\"\r\n\r\n\
            value\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file-bytes\r\n\
            --XX--\r\n";
        let req = Request::builder(Method::Post, "/upload")
            .header("Content-Type", "multipart/form-data; boundary=XX")
            .body(body)
            .build();

        let form = req.form();
        assert_eq!(form.get("test").map(String::as_str), Some("value"));

        let files = req.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "upload");
        assert_eq!(files[0].filename, "a.txt");
        assert_eq!(files[0].content_type.as_deref(), Some("text/plain"));
        assert_eq!(&files[0].data[..], b"file-bytes");
    }

    #[test]
    fn builder_splits_query() {
        let req = Request::builder(Method::Get, "/items?id=7").build();
        assert_eq!(req.path(), "/items");
        assert_eq!(req.query_param("id"), Some("7"));
    }

    #[test]
    fn builder_form_round_trip() {
        let req = Request::builder(Method::Post, "/create")
            .form(&[("test", "some thing")])
            .build();
        assert_eq!(
            req.form().get("test").map(String::as_str),
            Some("some thing")
        );
    }

    #[test]
    fn keep_alive_http11_default() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }
}
