//! Logging setup
//!
//! The library logs through the standard `log` crate facade (`info!` access
//! lines, `warn!` for per-connection faults, `debug!` for wire-level
//! detail); this module wires up `env_logger` as the backend for binaries
//! and tests that want output. Safe to call more than once.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the global logger, honoring `RUST_LOG` and defaulting to
/// `info` when unset
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .init();
    });
}
