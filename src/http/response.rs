//! HTTP response building and serialization
//!
//! Responses are built with a fluent API and serialized by the protocol that
//! owns the connection. A response body is either fully materialized
//! ([`Body::Full`]) or produced lazily as chunked transfer encoding
//! ([`Body::Streamed`]); the streamed form is finite, non-restartable, and
//! consumed exactly once.

use std::collections::HashMap;
use std::io::Write;

use super::constants::{content_types, headers, CRLF};

/// HTTP status codes used by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    // 1xx
    SwitchingProtocols = 101,

    // 2xx
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    // 3xx
    MovedPermanently = 301,
    Found = 302,

    // 4xx
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    Conflict = 409,
    UpgradeRequired = 426,

    // 5xx
    InternalServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::Conflict => "Conflict",
            StatusCode::UpgradeRequired => "Upgrade Required",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Producer of the chunk sequence behind a streamed response
pub type ChunkIter = Box<dyn Iterator<Item = Vec<u8>> + Send>;

/// A response body: fully materialized, or a lazy finite chunk sequence
pub enum Body {
    Full(Vec<u8>),
    Streamed(ChunkIter),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Full(b) => f.debug_tuple("Full").field(&b.len()).finish(),
            Body::Streamed(_) => f.debug_tuple("Streamed").finish(),
        }
    }
}

/// HTTP response with a fluent builder API
///
/// # Example
///
/// ```rust,ignore
/// use waygate::http::{Response, StatusCode};
///
/// let response = Response::ok().json(r#"{"message": "hello"}"#);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HashMap<String, String>,
    cookies: Vec<(String, String)>,
    body: Body,
}

impl Response {
    /// Create a response with the given status and an empty body
    pub fn new(status: StatusCode) -> Self {
        let mut headers = HashMap::new();
        headers.insert(headers::CONTENT_TYPE.to_string(), content_types::TEXT.to_string());

        Self { status, headers, cookies: Vec::new(), body: Body::Full(Vec::new()) }
    }

    // Convenience constructors

    /// 200 OK
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    /// 400 Bad Request
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BadRequest).text("400 Bad Request")
    }

    /// 404 Not Found
    pub fn not_found() -> Self {
        Self::new(StatusCode::NotFound).text("404 Not Found")
    }

    /// 500 Internal Server Error
    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::InternalServerError).text("Internal Server Error")
    }

    // Builder methods

    /// Set a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the Content-Type header
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(headers::CONTENT_TYPE, content_type)
    }

    /// Set the body as raw bytes
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Full(body);
        self
    }

    /// Set the body as plain text
    pub fn text(self, text: &str) -> Self {
        self.content_type(content_types::TEXT).body(text.as_bytes().to_vec())
    }

    /// Set the body as HTML
    pub fn html(self, html: &str) -> Self {
        self.content_type(content_types::HTML).body(html.as_bytes().to_vec())
    }

    /// Set the body as JSON
    pub fn json(self, json: &str) -> Self {
        self.content_type(content_types::JSON).body(json.as_bytes().to_vec())
    }

    /// Set a streamed body; the response serializes with
    /// `Transfer-Encoding: chunked` and no `Content-Length`
    pub fn streamed<I>(mut self, chunks: I) -> Self
    where
        I: Iterator<Item = Vec<u8>> + Send + 'static,
    {
        self.body = Body::Streamed(Box::new(chunks));
        self
    }

    /// Set a header in place (non-consuming form, for callers that only hold
    /// a `&mut Response`)
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Add a Set-Cookie line; one line is emitted per cookie, after the
    /// ordinary headers
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    // Accessors

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Serialize the head: status line, headers, Set-Cookie lines, blank line.
    ///
    /// For full bodies a `Content-Length` is injected unless already present;
    /// for streamed bodies `Transfer-Encoding: chunked` is set instead.
    fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {}{}", self.status, CRLF);

        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}{CRLF}"));
        }

        match &self.body {
            Body::Full(body) => {
                if !self.headers.contains_key(headers::CONTENT_LENGTH) {
                    head.push_str(&format!("{}: {}{}", headers::CONTENT_LENGTH, body.len(), CRLF));
                }
            }
            Body::Streamed(_) => {
                head.push_str(&format!("{}: chunked{}", headers::TRANSFER_ENCODING, CRLF));
            }
        }

        for (name, value) in &self.cookies {
            head.push_str(&format!("Set-Cookie: {name}={value}{CRLF}"));
        }

        head.push_str(CRLF);
        head.into_bytes()
    }

    /// Serialize a full response to raw bytes.
    ///
    /// # Panics
    ///
    /// Only valid for [`Body::Full`]; streamed responses must go through
    /// [`Response::write_to`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        match &self.body {
            Body::Full(body) => bytes.extend_from_slice(body),
            Body::Streamed(_) => unreachable!("streamed responses serialize via write_to"),
        }
        bytes
    }

    /// Write the response to a stream, consuming it.
    ///
    /// Full bodies are written as head + body in one piece. Streamed bodies
    /// send the head immediately, then each chunk as hex length, CRLF, chunk
    /// bytes, CRLF, terminated by the zero-length chunk.
    pub fn write_to<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        match self.body {
            Body::Full(_) => {
                w.write_all(&self.to_bytes())?;
            }
            Body::Streamed(_) => {
                w.write_all(&self.head_bytes())?;
                let Body::Streamed(chunks) = self.body else { unreachable!() };
                for chunk in chunks {
                    if chunk.is_empty() {
                        // a zero-length chunk would terminate the stream early
                        continue;
                    }
                    write!(w, "{:x}{}", chunk.len(), CRLF)?;
                    w.write_all(&chunk)?;
                    w.write_all(CRLF.as_bytes())?;
                }
                write!(w, "0{CRLF}{CRLF}")?;
            }
        }
        w.flush()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_display() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(StatusCode::SwitchingProtocols.to_string(), "101 Switching Protocols");
        assert_eq!(StatusCode::UpgradeRequired.to_string(), "426 Upgrade Required");
    }

    #[test]
    fn test_full_serialization_injects_content_length() {
        let bytes = Response::ok().text("Hello").to_bytes();
        let s = String::from_utf8(bytes).unwrap();

        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_explicit_content_length_is_kept() {
        let bytes =
            Response::ok().header("Content-Length", "5").body(b"Hello".to_vec()).to_bytes();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s.matches("Content-Length").count(), 1);
    }

    #[test]
    fn test_cookies_serialize_one_line_each() {
        let bytes = Response::ok().cookie("a", "1").cookie("b", "2").text("x").to_bytes();
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("Set-Cookie: a=1\r\n"));
        assert!(s.contains("Set-Cookie: b=2\r\n"));
    }

    #[test]
    fn test_streamed_serialization() {
        let chunks = vec![b"hello".to_vec(), b" ".to_vec(), b"world".to_vec()];
        let resp = Response::ok().streamed(chunks.into_iter());

        let mut out = Vec::new();
        resp.write_to(&mut out).unwrap();
        let s = String::from_utf8(out).unwrap();

        assert!(s.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.contains("5\r\nhello\r\n"));
        assert!(s.contains("1\r\n \r\n"));
        assert!(s.contains("5\r\nworld\r\n"));
        assert!(s.ends_with("0\r\n\r\n"));
    }

    #[test]
    fn test_streamed_skips_empty_chunks() {
        let chunks = vec![Vec::new(), b"data".to_vec(), Vec::new()];
        let resp = Response::ok().streamed(chunks.into_iter());

        let mut out = Vec::new();
        resp.write_to(&mut out).unwrap();
        let s = String::from_utf8(out).unwrap();

        // exactly one terminator, at the very end
        assert_eq!(s.matches("0\r\n\r\n").count(), 1);
        assert!(s.contains("4\r\ndata\r\n"));
    }
}
