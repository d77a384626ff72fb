//! Server configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Everything the core subsystems need (rate limits, timings, retention)
//! lives in [`lcp_core::CoreConfig`]; this wraps it with the server-only
//! settings (bind address, database path, log level) layered on top of the
//! domain config.

use std::net::SocketAddr;

use lcp_core::CoreConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// The shared domain configuration.
    pub core: CoreConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` — port to bind on (platform convention, binds to `0.0.0.0`)
    /// - `LCP_BIND_ADDR` — full bind address (overrides `PORT`, default: `127.0.0.1:8787`)
    /// - `LCP_DB_PATH` — path to the SQLite database file (default: `./lcp.db`)
    /// - `LCP_LOG_LEVEL` — log filter (default: `info`)
    /// - every `LCP_*` variable `CoreConfig::from_env` reads
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = if let Ok(addr) = std::env::var("LCP_BIND_ADDR") {
            addr.parse().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8787)))
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8787);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8787))
        };

        let db_path = std::env::var("LCP_DB_PATH").unwrap_or_else(|_| "./lcp.db".to_owned());
        let log_level = std::env::var("LCP_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        Self { bind_addr, db_path, log_level, core: CoreConfig::from_env() }
    }
}
