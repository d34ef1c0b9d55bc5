//! Endpoint handler types
//!
//! The server treats an endpoint as an opaque callable keyed by operation
//! name: an HTTP method name (`GET`, `POST`, ...) or `WEBSOCKET`. How the
//! callable came to exist is an external concern; a loader walks whatever
//! directory structure it likes and registers the resulting tables here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::{Method, Request, Response};
use crate::protocol::websocket::Portal;

/// Operation name claimed by the WebSocket protocol
pub const WEBSOCKET_OP: &str = "WEBSOCKET";

/// Result type endpoint handlers return; errors map to 500 at the dispatcher
pub type HandlerResult<T> = anyhow::Result<T>;

/// An HTTP endpoint: takes the parsed request (slugs filled in), returns a
/// complete or streamed response
pub type HttpHandler = Arc<dyn Fn(&Request) -> HandlerResult<Response> + Send + Sync>;

/// A WebSocket endpoint: owns the session through the portal until done
pub type WsHandler = Arc<dyn Fn(&Portal) -> HandlerResult<()> + Send + Sync>;

/// A handler reference stored in an endpoint table
#[derive(Clone)]
pub enum Endpoint {
    Http(HttpHandler),
    WebSocket(WsHandler),
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Http(_) => f.write_str("Endpoint::Http"),
            Endpoint::WebSocket(_) => f.write_str("Endpoint::WebSocket"),
        }
    }
}

/// Mapping from operation name to handler for one route leaf
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    entries: HashMap<String, Endpoint>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an HTTP handler for a method
    pub fn on<F>(mut self, method: Method, handler: F) -> Self
    where
        F: Fn(&Request) -> HandlerResult<Response> + Send + Sync + 'static,
    {
        self.entries.insert(method.as_str().to_string(), Endpoint::Http(Arc::new(handler)));
        self
    }

    /// Register the WebSocket handler for this route
    pub fn websocket<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Portal) -> HandlerResult<()> + Send + Sync + 'static,
    {
        self.entries.insert(WEBSOCKET_OP.to_string(), Endpoint::WebSocket(Arc::new(handler)));
        self
    }

    /// Insert a handler under an arbitrary operation name
    pub fn insert(&mut self, operation: &str, endpoint: Endpoint) {
        self.entries.insert(operation.to_string(), endpoint);
    }

    pub fn get(&self, operation: &str) -> Option<&Endpoint> {
        self.entries.get(operation)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Merge another table into this one; on duplicate operation names the
    /// incoming handler wins
    pub fn merge(&mut self, other: EndpointTable) {
        self.entries.extend(other.entries);
    }

    /// The subset of this table whose operation names appear in `operations`
    pub fn restrict(&self, operations: &[String]) -> EndpointTable {
        let entries = self
            .entries
            .iter()
            .filter(|(op, _)| operations.iter().any(|o| o == *op))
            .map(|(op, ep)| (op.clone(), ep.clone()))
            .collect();
        EndpointTable { entries }
    }

    /// Drop every entry whose operation name is not in `claimed`
    pub fn retain_claimed(&mut self, claimed: &[String]) {
        self.entries.retain(|op, _| claimed.iter().any(|c| c == op));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EndpointTable {
        EndpointTable::new()
            .on(Method::GET, |_| Ok(Response::ok()))
            .on(Method::POST, |_| Ok(Response::ok()))
            .websocket(|_| Ok(()))
    }

    #[test]
    fn test_restrict_filters_by_operation() {
        let t = table();
        let http_only = t.restrict(&["GET".to_string(), "POST".to_string()]);
        assert_eq!(http_only.len(), 2);
        assert!(http_only.get(WEBSOCKET_OP).is_none());

        let ws_only = t.restrict(&[WEBSOCKET_OP.to_string()]);
        assert_eq!(ws_only.len(), 1);
        assert!(matches!(ws_only.get(WEBSOCKET_OP), Some(Endpoint::WebSocket(_))));
    }

    #[test]
    fn test_retain_claimed_drops_unclaimed() {
        let mut t = table();
        t.retain_claimed(&["GET".to_string()]);
        assert_eq!(t.len(), 1);
        assert!(t.get("POST").is_none());
    }
}
