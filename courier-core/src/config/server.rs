//! Server configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server listening port
    /// Env: COURIER_PORT
    /// Default: 8080
    pub port: u16,

    /// Server listening address
    /// Env: COURIER_HOST
    /// Default: "127.0.0.1"
    pub host: String,

    /// Keep connections open between requests (HTTP/1.1 persistent connections)
    /// Env: COURIER_KEEP_ALIVE
    /// Default: true
    pub keep_alive: bool,

    /// Emit one access log line per written response
    /// Env: COURIER_LOG_REQUESTS
    /// Default: true
    pub log_requests: bool,

    /// Maximum size of a request head in bytes
    /// Env: COURIER_MAX_HEADER_SIZE
    /// Default: 16384 (16KB)
    pub max_header_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            keep_alive: true,
            log_requests: true,
            max_header_size: 16 * 1024,
        }
    }
}

impl ServerConfig {
    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.port = other.port;
        self.host = other.host;
        self.keep_alive = other.keep_alive;
        self.log_requests = other.log_requests;
        self.max_header_size = other.max_header_size;
    }

    /// Apply environment variables
    pub fn apply_env_vars(&mut self) {
        if let Ok(port) = env::var("COURIER_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }

        if let Ok(host) = env::var("COURIER_HOST") {
            self.host = host;
        }

        if let Ok(keep_alive) = env::var("COURIER_KEEP_ALIVE") {
            self.keep_alive = keep_alive.parse().unwrap_or(true);
        }

        if let Ok(log_requests) = env::var("COURIER_LOG_REQUESTS") {
            self.log_requests = log_requests.parse().unwrap_or(true);
        }

        if let Ok(size) = env::var("COURIER_MAX_HEADER_SIZE") {
            if let Ok(s) = size.parse() {
                self.max_header_size = s;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("Invalid port: port must be between 1 and 65535");
        }

        if self.host.is_empty() {
            bail!("Invalid host: host cannot be empty");
        }

        if self.max_header_size < 1024 {
            bail!("Invalid max_header_size: must be at least 1024 bytes");
        }

        Ok(())
    }

    /// `host:port` as given to the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
