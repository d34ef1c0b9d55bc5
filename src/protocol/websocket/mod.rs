//! WebSocket protocol (RFC 6455)
//!
//! Connections arrive as ordinary HTTP requests carrying upgrade headers;
//! identify recognizes those, handshake performs the opening exchange, and
//! handle hands the upgraded socket to the route's `WEBSOCKET` endpoint
//! through a [`Portal`].
//!
//! # Architecture
//!
//! - [`frame`] - wire-level frame codec
//! - [`portal`] - the live session object (reader thread, recv/send/ping/close)

pub mod frame;
pub mod portal;

pub use frame::{Frame, FrameError, Opcode};
pub use portal::{Message, Portal, PortalError};

use std::net::TcpStream;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::endpoint::{Endpoint, EndpointTable, WEBSOCKET_OP};
use crate::http::{Method, Request, Response, StatusCode};
use crate::protocol::Protocol;
use crate::{ServerError, ServerResult};

/// Fixed GUID appended to the client key when deriving the accept token
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Per-protocol configuration block, keyed `"websocket"` in
/// `ServerConfig::protocol_configs`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Largest payload length an inbound frame may advertise; oversized
    /// frames fail decode and the session closes with 1011
    pub max_payload_len: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { max_payload_len: 1 << 20 }
    }
}

/// Derive the `Sec-WebSocket-Accept` token for a client key:
/// SHA-1 over key + GUID, base64-encoded
pub fn accept_key(sec_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(sec_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The WebSocket upgrade protocol
pub struct WebSocketProtocol {
    config: WsConfig,
}

impl WebSocketProtocol {
    pub fn new() -> Self {
        Self { config: WsConfig::default() }
    }

    pub fn with_config(config: WsConfig) -> Self {
        Self { config }
    }

    /// Build from the raw JSON block found under this protocol's config key
    pub fn from_config_value(value: &serde_json::Value) -> anyhow::Result<Self> {
        let config: WsConfig = serde_json::from_value(value.clone())?;
        Ok(Self::with_config(config))
    }

    fn reject(stream: &mut TcpStream, response: Response) -> ServerResult<bool> {
        response.write_to(stream)?;
        Ok(false)
    }
}

impl Default for WebSocketProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for WebSocketProtocol {
    fn config_key(&self) -> &'static str {
        "websocket"
    }

    fn claimed_operations(&self) -> Vec<String> {
        vec![WEBSOCKET_OP.to_string()]
    }

    /// A connection is an upgrade candidate only if the initial bytes parse
    /// as a valid HTTP request whose `Connection` header lists `Upgrade` and
    /// whose `Upgrade` header is `websocket` (both case-insensitive)
    fn identify(&self, initial: &[u8]) -> bool {
        let Ok(request) = Request::parse(initial) else {
            return false;
        };

        let connection_upgrades = request
            .header("connection")
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        let upgrade_is_websocket = request
            .header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);

        connection_upgrades && upgrade_is_websocket
    }

    fn handshake(&self, stream: &mut TcpStream, request: &Request) -> ServerResult<bool> {
        if request.method() != Method::GET || request.header("host").is_none() {
            return Self::reject(stream, Response::bad_request());
        }

        if request.header("sec-websocket-version") != Some("13") {
            let response = Response::new(StatusCode::UpgradeRequired)
                .header("Upgrade", "websocket")
                .header("Sec-WebSocket-Version", "13");
            return Self::reject(stream, response);
        }

        let Some(key) = request.header("sec-websocket-key") else {
            return Self::reject(stream, Response::bad_request());
        };
        match BASE64.decode(key) {
            Ok(raw) if raw.len() == 16 => {}
            _ => return Self::reject(stream, Response::bad_request()),
        }

        let response = Response::new(StatusCode::SwitchingProtocols)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", &accept_key(key));
        response.write_to(stream)?;

        if let Ok(peer) = stream.peer_addr() {
            log::info!("{} {} upgraded to websocket ({})", request.method(), request.path(), peer.ip());
        }
        Ok(true)
    }

    fn handle(
        &self,
        stream: &mut TcpStream,
        request: &Request,
        endpoints: &EndpointTable,
    ) -> ServerResult<()> {
        let endpoint = endpoints
            .get(WEBSOCKET_OP)
            .ok_or_else(|| ServerError::NoEndpoint(WEBSOCKET_OP.to_string()))?;

        let Endpoint::WebSocket(handler) = endpoint else {
            return Err(ServerError::Handler(anyhow::anyhow!(
                "WEBSOCKET operation bound to a non-websocket endpoint"
            )));
        };

        let portal = Portal::open(
            stream.try_clone()?,
            request.slugs.clone(),
            self.config.max_payload_len,
        )?;

        let outcome = handler(&portal).map_err(ServerError::Handler);
        portal.close();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc6455_accept_key_vector() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    fn upgrade_request(extra: &str) -> Vec<u8> {
        format!(
            "GET /chat HTTP/1.1\r\nHost: example\r\nConnection: Upgrade\r\n\
             Upgrade: websocket\r\n{extra}\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_identify_accepts_upgrade_requests() {
        let protocol = WebSocketProtocol::new();
        assert!(protocol.identify(&upgrade_request("")));
    }

    #[test]
    fn test_identify_is_case_insensitive_on_upgrade_value() {
        let protocol = WebSocketProtocol::new();
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive, Upgrade\r\n\
                    Upgrade: WebSocket\r\n\r\n";
        assert!(protocol.identify(raw));
    }

    #[test]
    fn test_identify_rejects_plain_http() {
        let protocol = WebSocketProtocol::new();
        assert!(!protocol.identify(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(!protocol.identify(b"GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n"));
        assert!(!protocol.identify(b"not http at all"));
    }

    #[test]
    fn test_ws_config_from_json() {
        let value = serde_json::json!({ "max_payload_len": 4096 });
        let protocol = WebSocketProtocol::from_config_value(&value).unwrap();
        assert_eq!(protocol.config.max_payload_len, 4096);

        // missing fields fall back to defaults
        let protocol = WebSocketProtocol::from_config_value(&serde_json::json!({})).unwrap();
        assert_eq!(protocol.config.max_payload_len, 1 << 20);
    }

    #[test]
    fn test_claims_only_websocket() {
        assert_eq!(WebSocketProtocol::new().claimed_operations(), vec!["WEBSOCKET".to_string()]);
    }
}
