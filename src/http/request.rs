//! HTTP request parsing and representation
//!
//! Requests arrive as a single raw byte chunk read off the socket. The head is
//! decoded as ISO-8859-1 (every byte maps to a char, so decoding itself never
//! fails); the body is kept as raw bytes. A missing blank line between head
//! and body is a malformed request, as is any header line without a colon.

use std::collections::HashMap;
use std::str::FromStr;

use super::constants::{headers, DOUBLE_CRLF_BYTES};
use super::{HttpError, HttpResult};

/// HTTP methods understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    /// All methods, in a fixed order. The HTTP/1.1 protocol claims exactly
    /// these operation names in the route tree.
    pub const ALL: [Method; 9] = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::CONNECT,
        Method::OPTIONS,
        Method::TRACE,
        Method::PATCH,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            _ => Err(HttpError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP protocol versions the codec accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http1_0,
    Http1_1,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http1_0 => "HTTP/1.0",
            Version::Http1_1 => "HTTP/1.1",
        }
    }
}

impl FromStr for Version {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(Version::Http1_0),
            "HTTP/1.1" => Ok(Version::Http1_1),
            _ => Err(HttpError::UnsupportedProtocol(s.to_string())),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Flat query parameters; duplicate keys resolve last-value-wins
pub type QueryParams = HashMap<String, String>;

/// Request headers, keyed by lowercased name
pub type Headers = HashMap<String, String>;

/// A parsed HTTP request.
///
/// All wire-derived fields are immutable after parsing. The slug map is the
/// one mutable piece: the router fills it in after resolving the path against
/// the route tree.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query_params: QueryParams,
    version: Version,
    headers: Headers,
    cookies: HashMap<String, String>,
    body: Vec<u8>,
    /// Slug bindings captured during route resolution, e.g. `id -> "42"`
    pub slugs: HashMap<String, String>,
}

impl Request {
    /// Parse an HTTP request from the raw bytes read off the socket.
    ///
    /// # Errors
    ///
    /// Any structural problem (no head/body separator, bad request line,
    /// unknown method, unsupported protocol token, colon-less header line,
    /// HTTP/1.1 without `Host`) yields an [`HttpError`]; the caller answers
    /// all of them with 400.
    pub fn parse(raw: &[u8]) -> HttpResult<Self> {
        let split = find_head_end(raw)
            .ok_or_else(|| HttpError::InvalidRequest("no head/body separator".to_string()))?;

        let head = latin1_to_string(&raw[..split]);
        let body = raw[split + DOUBLE_CRLF_BYTES.len()..].to_vec();

        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| HttpError::InvalidRequest("empty request".to_string()))?;

        let (method, target, version) = parse_request_line(request_line)?;
        let headers = parse_headers(lines)?;

        if version == Version::Http1_1 && !headers.contains_key(headers::HOST) {
            return Err(HttpError::MissingHost);
        }

        let cookies = parse_cookies(headers.get(headers::COOKIE).map(String::as_str));
        let (path, query_params) = parse_target(&target);

        Ok(Self {
            method,
            path,
            query_params,
            version,
            headers,
            cookies,
            body,
            slugs: HashMap::new(),
        })
    }

    // Accessors

    pub fn method(&self) -> Method {
        self.method
    }

    /// Request path, without the query string
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(|s| s.as_str())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Look up a header by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Slug binding captured by the router, e.g. `id` for a `[id]` segment
    pub fn slug(&self, name: &str) -> Option<&str> {
        self.slugs.get(name).map(|s| s.as_str())
    }
}

/// Locate the first blank line separating head from body
fn find_head_end(raw: &[u8]) -> Option<usize> {
    raw.windows(DOUBLE_CRLF_BYTES.len()).position(|w| w == DOUBLE_CRLF_BYTES)
}

/// ISO-8859-1 decode: every byte maps 1:1 onto U+0000..U+00FF
fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse the request line, e.g. `GET /users?page=1 HTTP/1.1`
fn parse_request_line(line: &str) -> HttpResult<(Method, String, Version)> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(protocol), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::InvalidRequest(format!("invalid request line: {line}")));
    };

    Ok((method.parse()?, target.to_string(), protocol.parse()?))
}

/// Parse header lines; keys are lowercased, values trimmed
fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HttpResult<Headers> {
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::InvalidHeaders(format!("no colon in header line: {line}")));
        };
        headers.insert(name.trim().to_lowercase(), value.trim().to_string());
    }

    Ok(headers)
}

/// Parse the Cookie header into a flat map; malformed pairs are skipped
fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    if let Some(value) = header {
        for pair in value.split(';') {
            if let Some((k, v)) = pair.split_once('=') {
                cookies.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
    }
    cookies
}

/// Split the target URL into path and query parameters.
///
/// Duplicate query keys resolve last-value-wins; keys without `=` map to the
/// empty string. Percent-decoding that produces invalid UTF-8 keeps the raw
/// token.
fn parse_target(target: &str) -> (String, QueryParams) {
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(url_decode(key), url_decode(value));
    }

    (path.to_string(), params)
}

fn url_decode(s: &str) -> String {
    urlencoding::decode(s).map(|c| c.into_owned()).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::GET);
        assert_eq!("post".parse::<Method>().unwrap(), Method::POST);
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!("HTTP/1.1".parse::<Version>().unwrap(), Version::Http1_1);
        assert_eq!("HTTP/1.0".parse::<Version>().unwrap(), Version::Http1_0);
        assert!("HTTP/2.0".parse::<Version>().is_err());
        assert!("SPDY/3".parse::<Version>().is_err());
    }

    #[test]
    fn test_parse_round_trip() {
        let raw = b"POST /users?page=1&name=a%20b HTTP/1.1\r\n\
                    Host: localhost\r\n\
                    Content-Type: application/json\r\n\r\n\
                    {\"k\":1}";
        let req = Request::parse(raw).unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.path(), "/users");
        assert_eq!(req.version(), Version::Http1_1);
        assert_eq!(req.query_param("page"), Some("1"));
        assert_eq!(req.query_param("name"), Some("a b"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.body(), b"{\"k\":1}");
    }

    #[test]
    fn test_missing_host_on_http11_fails() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(HttpError::MissingHost)));
    }

    #[test]
    fn test_http10_does_not_require_host() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        assert!(Request::parse(raw).is_ok());
    }

    #[test]
    fn test_missing_blank_line_is_malformed() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n";
        assert!(matches!(Request::parse(raw), Err(HttpError::InvalidRequest(_))));
    }

    #[test]
    fn test_header_without_colon_is_malformed() {
        let raw = b"GET / HTTP/1.1\r\nHost localhost\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(HttpError::InvalidHeaders(_))));
    }

    #[test]
    fn test_duplicate_query_keys_last_wins() {
        let raw = b"GET /?a=1&a=2&a=3 HTTP/1.1\r\nHost: x\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.query_param("a"), Some("3"));
    }

    #[test]
    fn test_query_key_without_value() {
        let raw = b"GET /?flag HTTP/1.1\r\nHost: x\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.query_param("flag"), Some(""));
    }

    #[test]
    fn test_cookie_parsing() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\nCookie: session=abc; theme=dark\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.cookie("session"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
    }

    #[test]
    fn test_latin1_head_is_accepted() {
        // 0xE9 is 'e' acute in ISO-8859-1 and invalid standalone UTF-8
        let mut raw = b"GET / HTTP/1.1\r\nHost: x\r\nX-Name: caf".to_vec();
        raw.push(0xE9);
        raw.extend_from_slice(b"\r\n\r\n");
        let req = Request::parse(&raw).unwrap();
        assert_eq!(req.header("x-name"), Some("caf\u{e9}"));
    }
}
