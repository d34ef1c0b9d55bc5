//! Hand-rolled HTTP/1.x codec
//!
//! This module implements HTTP/1.0 and HTTP/1.1 request parsing and response
//! serialization from scratch over raw bytes. No pre-built HTTP library is
//! involved; the server reads a chunk from the socket and hands it to
//! [`Request::parse`], and writes whatever [`Response`] serializes to.
//!
//! # Architecture
//!
//! - [`request`] - request parsing and representation
//! - [`response`] - response building and serialization (full or chunked)

pub mod request;
pub mod response;

pub use request::{Headers, Method, QueryParams, Request, Version};
pub use response::{Body, ChunkIter, Response, StatusCode};

/// Result type for HTTP codec operations
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// HTTP-level parse failures.
///
/// Every variant describes malformed client input; the dispatcher answers all
/// of them uniformly with `400 Bad Request`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    /// Request is structurally broken (no head/body split, bad request line, ...)
    #[error("invalid HTTP request: {0}")]
    InvalidRequest(String),
    /// Method token is not a known HTTP method
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    /// Protocol token is not HTTP/1.0 or HTTP/1.1
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    /// A header line without a colon
    #[error("invalid headers: {0}")]
    InvalidHeaders(String),
    /// An HTTP/1.1 request without a Host header
    #[error("missing Host header")]
    MissingHost,
}

/// HTTP/1.1 protocol constants
pub mod constants {
    /// Line ending used throughout the wire format
    pub const CRLF: &str = "\r\n";
    /// Head/body separator
    pub const DOUBLE_CRLF_BYTES: &[u8] = b"\r\n\r\n";

    /// Header names the codec and protocols care about (request headers are
    /// stored lowercased)
    pub mod headers {
        pub const CONTENT_TYPE: &str = "Content-Type";
        pub const CONTENT_LENGTH: &str = "Content-Length";
        pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
        pub const CONNECTION: &str = "connection";
        pub const UPGRADE: &str = "upgrade";
        pub const HOST: &str = "host";
        pub const COOKIE: &str = "cookie";
    }

    /// Common content types
    pub mod content_types {
        pub const TEXT: &str = "text/plain";
        pub const HTML: &str = "text/html; charset=utf-8";
        pub const JSON: &str = "application/json";
    }
}
