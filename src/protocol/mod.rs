//! Protocol abstraction and registry
//!
//! A [`Protocol`] is one way of speaking to a client over an accepted socket.
//! The dispatcher asks each registered protocol, most recently registered
//! first, to [`Protocol::identify`] the connection's initial bytes; the first
//! match performs its [`Protocol::handshake`] and then owns the connection
//! through [`Protocol::handle`].
//!
//! Each protocol claims a set of endpoint operation names (HTTP/1.1 claims
//! the method names, WebSocket claims `WEBSOCKET`). Claims must be disjoint
//! across the registry; a conflicting registration is rejected immediately.

pub mod http1;
pub mod websocket;

pub use http1::Http1Protocol;
pub use websocket::WebSocketProtocol;

use std::net::TcpStream;
use std::sync::Arc;

use crate::endpoint::EndpointTable;
use crate::http::Request;
use crate::ServerResult;

/// Registration-time errors; fatal, raised before any connection is accepted
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("operation {operation:?} is already claimed by a registered protocol")]
    ClaimConflict { operation: String },
}

/// One concrete wire protocol the server can negotiate
pub trait Protocol: Send + Sync {
    /// Key under which this protocol's block lives in
    /// `ServerConfig::protocol_configs`
    fn config_key(&self) -> &'static str;

    /// Endpoint operation names this protocol claims from route leaves
    fn claimed_operations(&self) -> Vec<String>;

    /// Whether the initial bytes read from the connection belong to this
    /// protocol
    fn identify(&self, initial: &[u8]) -> bool;

    /// Perform the opening negotiation.
    ///
    /// `Ok(true)` proceeds to [`Protocol::handle`]; `Ok(false)` means the
    /// protocol already answered the client (e.g. a 426 version rejection)
    /// and the dispatcher should just close; `Err` makes the dispatcher
    /// answer 400.
    fn handshake(&self, stream: &mut TcpStream, request: &Request) -> ServerResult<bool>;

    /// Run the matched endpoint. `endpoints` is already restricted to this
    /// protocol's claimed operations; slug bindings live on the request.
    fn handle(
        &self,
        stream: &mut TcpStream,
        request: &Request,
        endpoints: &EndpointTable,
    ) -> ServerResult<()>;
}

/// Insertion-ordered protocol list with disjoint operation claims.
///
/// The most recently registered protocol gets first refusal at identify
/// time, so an upgrade protocol registered after HTTP/1.1 wins the upgrade
/// request it recognizes.
#[derive(Default)]
pub struct ProtocolRegistry {
    protocols: Vec<Arc<dyn Protocol>>,
    claimed: Vec<String>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol, rejecting any overlap with already-claimed
    /// operation names.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) -> Result<(), RegistryError> {
        for operation in protocol.claimed_operations() {
            if self.claimed.contains(&operation) {
                return Err(RegistryError::ClaimConflict { operation });
            }
        }

        self.claimed.extend(protocol.claimed_operations());
        self.protocols.insert(0, protocol);
        Ok(())
    }

    /// Every operation name claimed by some registered protocol
    pub fn claimed_operations(&self) -> &[String] {
        &self.claimed
    }

    /// First protocol (most recently registered first) whose `identify`
    /// accepts the initial bytes
    pub fn identify(&self, initial: &[u8]) -> Option<&dyn Protocol> {
        self.protocols.iter().find(|p| p.identify(initial)).map(|p| p.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.protocols.len())
            .field("claimed", &self.claimed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProtocol {
        ops: Vec<String>,
        wants: &'static [u8],
    }

    impl Protocol for FakeProtocol {
        fn config_key(&self) -> &'static str {
            "fake"
        }
        fn claimed_operations(&self) -> Vec<String> {
            self.ops.clone()
        }
        fn identify(&self, initial: &[u8]) -> bool {
            initial.starts_with(self.wants)
        }
        fn handshake(&self, _: &mut TcpStream, _: &Request) -> ServerResult<bool> {
            Ok(true)
        }
        fn handle(&self, _: &mut TcpStream, _: &Request, _: &EndpointTable) -> ServerResult<()> {
            Ok(())
        }
    }

    fn proto(ops: &[&str], wants: &'static [u8]) -> Arc<dyn Protocol> {
        Arc::new(FakeProtocol { ops: ops.iter().map(|s| s.to_string()).collect(), wants })
    }

    #[test]
    fn test_overlapping_claims_rejected() {
        let mut registry = ProtocolRegistry::new();
        registry.register(proto(&["GET", "POST"], b"a")).unwrap();
        let err = registry.register(proto(&["POST"], b"b")).unwrap_err();
        assert!(matches!(err, RegistryError::ClaimConflict { operation } if operation == "POST"));
    }

    #[test]
    fn test_last_registered_has_first_refusal() {
        let mut registry = ProtocolRegistry::new();
        registry.register(proto(&["A"], b"x")).unwrap();
        registry.register(proto(&["B"], b"x")).unwrap();

        // both identify b"x..."; the later registration must win
        let winner = registry.identify(b"xyz").unwrap();
        assert_eq!(winner.claimed_operations(), vec!["B".to_string()]);
    }

    #[test]
    fn test_no_protocol_identifies() {
        let mut registry = ProtocolRegistry::new();
        registry.register(proto(&["A"], b"x")).unwrap();
        assert!(registry.identify(b"zzz").is_none());
    }

    #[test]
    fn test_claims_accumulate() {
        let mut registry = ProtocolRegistry::new();
        registry.register(proto(&["A"], b"x")).unwrap();
        registry.register(proto(&["B", "C"], b"y")).unwrap();
        assert_eq!(registry.claimed_operations().len(), 3);
    }
}
