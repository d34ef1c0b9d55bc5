//! Convenient single-line import for server setup
//!
//! ```rust,ignore
//! use waygate::prelude::*;
//! ```

pub use crate::config::ServerConfig;
pub use crate::endpoint::{Endpoint, EndpointTable, HandlerResult};
pub use crate::http::{Method, Request, Response, StatusCode};
pub use crate::protocol::websocket::{Message, Portal, WsConfig};
pub use crate::protocol::{Http1Protocol, Protocol, WebSocketProtocol};
pub use crate::server::{Server, ServerHandle};
pub use crate::{ServerError, ServerResult};
