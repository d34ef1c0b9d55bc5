//! HTTP/1.1 protocol
//!
//! The baseline protocol: any connection whose initial bytes parse as a
//! well-formed HTTP request belongs here (unless a more recently registered
//! protocol claimed it first). There is no wire-level handshake; the
//! handshake step only logs the access line.

use std::net::TcpStream;

use crate::endpoint::{Endpoint, EndpointTable};
use crate::http::{Method, Request, Response};
use crate::protocol::Protocol;
use crate::{ServerError, ServerResult};

/// HTTP/1.0 and HTTP/1.1 request handling over a raw socket
pub struct Http1Protocol {
    server_name: String,
}

impl Http1Protocol {
    pub fn new(server_name: &str) -> Self {
        Self { server_name: server_name.to_string() }
    }
}

impl Default for Http1Protocol {
    fn default() -> Self {
        Self::new("Waygate")
    }
}

impl Protocol for Http1Protocol {
    fn config_key(&self) -> &'static str {
        "http1"
    }

    fn claimed_operations(&self) -> Vec<String> {
        Method::ALL.iter().map(|m| m.as_str().to_string()).collect()
    }

    fn identify(&self, initial: &[u8]) -> bool {
        Request::parse(initial).is_ok()
    }

    fn handshake(&self, stream: &mut TcpStream, request: &Request) -> ServerResult<bool> {
        if let Ok(peer) = stream.peer_addr() {
            log::info!("{} {} from {}", request.method(), request.path(), peer.ip());
        }
        Ok(true)
    }

    fn handle(
        &self,
        stream: &mut TcpStream,
        request: &Request,
        endpoints: &EndpointTable,
    ) -> ServerResult<()> {
        let operation = request.method().as_str();
        let endpoint = endpoints
            .get(operation)
            .ok_or_else(|| ServerError::NoEndpoint(operation.to_string()))?;

        let Endpoint::Http(handler) = endpoint else {
            return Err(ServerError::Handler(anyhow::anyhow!(
                "operation {operation} is not an HTTP endpoint"
            )));
        };

        let mut response = handler(request).map_err(ServerError::Handler)?;
        response.set_header("Server", &self.server_name);

        let status = response.status();
        response.write_to(stream)?;

        if let Ok(peer) = stream.peer_addr() {
            log::info!("{} -> {}", status.as_u16(), peer.ip());
        }
        Ok(())
    }
}
