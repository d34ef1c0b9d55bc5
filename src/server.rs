//! Server instance, accept loop, and per-connection dispatcher
//!
//! One [`Server`] owns the route registrations, the protocol registry, and —
//! once serving — the listening socket. Routes and protocols are registered
//! on the builder; [`Server::serve`] consumes it, so registration after the
//! server has begun accepting connections is impossible by construction.
//!
//! Each accepted connection runs on its own thread through a fixed pipeline:
//! read the initial bytes, parse a request, resolve the route, pick a
//! protocol, handshake, hand off to the protocol's `handle`. Failures exit
//! to 400/404/500 at the stage where they occur, and the socket always
//! closes when the pipeline returns.

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::endpoint::EndpointTable;
use crate::http::{Request, Response, StatusCode};
use crate::protocol::{Http1Protocol, Protocol, ProtocolRegistry};
use crate::routes::{RouteTree, RouteTreeBuilder};
use crate::{ServerError, ServerResult};

/// How often the accept loop checks the shutdown flag between polls
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Server builder: collects configuration, routes, and protocols, then
/// converts into a running accept loop.
///
/// # Example
///
/// ```rust,ignore
/// use waygate::prelude::*;
///
/// let mut server = Server::new(ServerConfig::default());
/// server.route("hello", EndpointTable::new().on(Method::GET, |_| Ok(Response::ok().text("hi"))))?;
/// let handle = server.serve("127.0.0.1:8080")?;
/// handle.join();
/// ```
pub struct Server {
    config: ServerConfig,
    registry: ProtocolRegistry,
    routes: RouteTreeBuilder,
}

impl Server {
    /// Create a server with the HTTP/1.1 protocol pre-registered
    pub fn new(config: ServerConfig) -> Self {
        let mut registry = ProtocolRegistry::new();
        let http1 = Http1Protocol::new(&config.server_name);
        registry
            .register(Arc::new(http1))
            .unwrap_or_else(|_| unreachable!("empty registry cannot conflict"));

        Self { config, registry, routes: RouteTreeBuilder::new() }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register an additional protocol. The most recently registered
    /// protocol gets first refusal at identify time.
    ///
    /// # Errors
    ///
    /// Rejects protocols whose claimed operation names overlap an existing
    /// registration.
    pub fn register_protocol(&mut self, protocol: Arc<dyn Protocol>) -> ServerResult<()> {
        self.registry.register(protocol)?;
        Ok(())
    }

    /// Merge an endpoint table at a route path (see [`RouteTreeBuilder`]).
    ///
    /// # Errors
    ///
    /// Route validation failures (bad segment charset, slug reuse,
    /// normalized-path collisions) are fatal configuration errors.
    pub fn route(&mut self, path: &str, table: EndpointTable) -> ServerResult<()> {
        self.routes.insert(path, table)?;
        Ok(())
    }

    /// Bind the listener and start accepting connections on a background
    /// thread. Consumes the server: no further registration is possible.
    pub fn serve(self, addr: &str) -> ServerResult<ServerHandle> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let tree = self.routes.build(self.registry.claimed_operations());
        let inner = Arc::new(Inner { config: self.config, registry: self.registry, tree });

        log::info!("listening on http://{local_addr}");

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("waygate-accept".to_string())
            .spawn(move || accept_loop(listener, inner, flag))?;

        Ok(ServerHandle { local_addr, shutdown, thread })
    }
}

/// Handle to a running server: exposes the bound address and a prompt,
/// clean shutdown of the accept loop
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the listener actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// In-flight connection threads are not interrupted.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.thread.join();
    }

    /// Block until the accept loop exits on its own
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Everything connection threads share, read-only while serving
struct Inner {
    config: ServerConfig,
    registry: ProtocolRegistry,
    tree: RouteTree,
}

/// Poll the non-blocking listener so the shutdown flag is observed promptly
fn accept_loop(listener: TcpListener, inner: Arc<Inner>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let inner = Arc::clone(&inner);
                let spawned = thread::Builder::new()
                    .name("waygate-conn".to_string())
                    .spawn(move || handle_connection(&inner, stream));
                if let Err(err) = spawned {
                    log::error!("failed to spawn connection thread: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                log::error!("failed to accept connection: {err}");
            }
        }
    }
    log::info!("accept loop stopped");
}

/// Status code each dispatcher-level failure maps to
fn status_for(err: &ServerError) -> StatusCode {
    match err {
        ServerError::Http(_) | ServerError::NoProtocol => StatusCode::BadRequest,
        ServerError::RouteNotFound | ServerError::NoEndpoint(_) => StatusCode::NotFound,
        _ => StatusCode::InternalServerError,
    }
}

fn error_response(status: StatusCode, server_name: &str) -> Response {
    let response = match status {
        StatusCode::BadRequest => Response::bad_request(),
        StatusCode::NotFound => Response::not_found(),
        _ => Response::internal_server_error(),
    };
    response.header("Server", server_name)
}

/// Run one connection through the full pipeline and always close the socket
fn handle_connection(inner: &Inner, mut stream: TcpStream) {
    if let Err(err) = dispatch(inner, &mut stream) {
        let status = status_for(&err);
        match status {
            StatusCode::InternalServerError => log::error!("connection failed: {err}"),
            _ => log::debug!("{} for {err}", status.as_u16()),
        }
        // best effort: the peer may already be gone
        let _ = error_response(status, &inner.config.server_name).write_to(&mut stream);
    }
    // stream drops here, closing the socket regardless of outcome
}

/// The per-connection state machine:
/// accepted -> parsed -> protocol matched -> handshaken -> handled
fn dispatch(inner: &Inner, stream: &mut TcpStream) -> ServerResult<()> {
    let mut buf = vec![0u8; inner.config.max_request_size];
    let n = stream.read(&mut buf)?;
    if n == 0 {
        // connection opened and closed without sending anything
        return Ok(());
    }
    let initial = &buf[..n];

    let mut request = Request::parse(initial)?;

    let matched = inner.tree.resolve(request.path()).ok_or(ServerError::RouteNotFound)?;
    request.slugs = matched.slugs;

    let protocol = inner.registry.identify(initial).ok_or(ServerError::NoProtocol)?;

    if !protocol.handshake(stream, &request)? {
        // the protocol already answered the client (e.g. a 426)
        return Ok(());
    }

    let endpoints = matched.endpoints.restrict(&protocol.claimed_operations());
    protocol.handle(stream, &request, &endpoints)
}
