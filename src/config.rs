//! Server configuration
//!
//! Configuration is declarative JSON: every field has a default, unknown
//! fields in the file are ignored, and type mismatches fail the load with a
//! field-level error. Per-protocol blocks are kept as raw JSON values keyed
//! by the protocol's declared config key and handed to the protocol when it
//! is constructed (see `WebSocketProtocol::from_config_value`).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory the endpoint loader walks for route definitions.
    /// Consumed by the loader, not by the server core.
    /// Default: "./api"
    pub api_directory: String,

    /// Maximum number of bytes read for the initial request.
    /// Default: 4096
    pub max_request_size: usize,

    /// Value of the Server response header.
    /// Default: "Waygate"
    pub server_name: String,

    /// Filename stem the loader treats as an endpoint definition within a
    /// route directory. Consumed by the loader, not by the server core.
    /// Default: "path"
    pub path_script_name: String,

    /// Raw per-protocol configuration blocks, keyed by each protocol's
    /// config key (e.g. "websocket")
    pub protocol_configs: HashMap<String, serde_json::Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_directory: "./api".to_string(),
            max_request_size: 4096,
            server_name: "Waygate".to_string(),
            path_script_name: "path".to_string(),
            protocol_configs: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: ServerConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the type system cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_request_size == 0 {
            bail!("max_request_size must be greater than zero");
        }
        if self.server_name.is_empty() {
            bail!("server_name must not be empty");
        }
        Ok(())
    }

    /// The raw configuration block for one protocol, if present
    pub fn protocol_config(&self, key: &str) -> Option<&serde_json::Value> {
        self.protocol_configs.get(key)
    }
}
