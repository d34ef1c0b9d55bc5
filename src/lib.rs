//! Waygate - a from-scratch HTTP/1.1 + WebSocket server
//!
//! Waygate speaks HTTP/1.1 and upgrades connections to WebSocket over raw
//! TCP sockets, routing requests to handler functions registered under a
//! filesystem-shaped path tree. Wire parsing, framing, handshakes, and
//! dispatch are all hand-rolled; no HTTP or WebSocket library sits
//! underneath.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use waygate::prelude::*;
//!
//! fn main() -> waygate::ServerResult<()> {
//!     waygate::logging::init();
//!
//!     let mut server = Server::new(ServerConfig::default());
//!     server.register_protocol(std::sync::Arc::new(WebSocketProtocol::new()))?;
//!
//!     server.route(
//!         "users/[id]",
//!         EndpointTable::new()
//!             .on(Method::GET, |req| {
//!                 let id = req.slug("id").unwrap_or("?");
//!                 Ok(Response::ok().text(&format!("user {id}")))
//!             })
//!             .websocket(|portal| {
//!                 while let Ok(msg) = portal.recv(None) {
//!                     portal.send(msg)?;
//!                 }
//!                 Ok(())
//!             }),
//!     )?;
//!
//!     server.serve("127.0.0.1:8080")?.join();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`http`] - HTTP/1.x request/response codec, built from raw bytes
//! - [`routes`] - route tree with `[slug]` segments, validated at build time
//! - [`protocol`] - the protocol abstraction plus the HTTP/1.1 and
//!   WebSocket implementations (handshake, frame codec, portal)
//! - [`server`] - accept loop and the per-connection dispatch pipeline
//! - [`config`] - declarative JSON configuration
//! - [`logging`] - `log`-facade setup for binaries and tests
//!
//! # Concurrency model
//!
//! One thread per accepted connection; upgraded WebSocket sessions add one
//! background reader thread per portal. The route tree is built before the
//! first accept and shared read-only; sockets, requests, and portals are
//! exclusively owned by their connection's thread.

pub mod config;
pub mod endpoint;
pub mod http;
pub mod logging;
pub mod protocol;
pub mod routes;
pub mod server;

pub mod prelude;

pub use config::ServerConfig;
pub use endpoint::{Endpoint, EndpointTable, HandlerResult};
pub use http::{Method, Request, Response, StatusCode};
pub use protocol::websocket::{Message, Portal};
pub use protocol::{Http1Protocol, Protocol, WebSocketProtocol};
pub use server::{Server, ServerHandle};

/// Result type for server operations
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Umbrella error for everything the server surfaces.
///
/// Parse and negotiation failures map to 400 at the dispatcher boundary,
/// missing routes/endpoints to 404, and everything else to 500; the
/// registration-time variants are fatal before any connection is accepted.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed client request (uniformly answered with 400)
    #[error(transparent)]
    Http(#[from] http::HttpError),
    /// Build-time route configuration failure
    #[error(transparent)]
    Route(#[from] routes::RouteError),
    /// Protocol registration conflict
    #[error(transparent)]
    Registry(#[from] protocol::RegistryError),
    /// WebSocket session failure
    #[error(transparent)]
    Portal(#[from] protocol::websocket::PortalError),
    /// No route tree node matches the requested path
    #[error("no route matches the requested path")]
    RouteNotFound,
    /// The resolved leaf has no handler for the negotiated operation
    #[error("no endpoint for operation {0}")]
    NoEndpoint(String),
    /// No registered protocol identified the connection
    #[error("no compatible protocol")]
    NoProtocol,
    /// Endpoint handler returned an error (answered with 500)
    #[error("endpoint handler failed: {0}")]
    Handler(#[source] anyhow::Error),
    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
