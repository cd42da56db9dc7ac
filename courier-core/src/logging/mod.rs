//! Logging setup and access logging
//!
//! Everything logs through the standard `log` macros. [`init_logging`]
//! installs `env_logger` once at startup; `RUST_LOG` still overrides the
//! configured level.
//!
//! Access lines go through the [`AccessLog`] collaborator after every
//! written response. The default [`LogAccessLog`] writes an Apache-style
//! line under the `courier::access` target, so it can be filtered
//! separately (`RUST_LOG=courier::access=off`).
//!
//! ```rust,no_run
//! use courier_core::config::LoggingConfig;
//!
//! courier_core::logging::init_logging(&LoggingConfig::default());
//! log::info!("Server starting on port {}", 8080);
//! ```

use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use crate::config::LoggingConfig;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpVersion};

/// Log target used for access lines
pub const ACCESS_TARGET: &str = "courier::access";

/// Initialize `env_logger` from the configuration.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if config.timestamps {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp(None);
    }
    builder.format_module_path(config.module_path);

    // try_init avoids a panic if a logger is already installed
    let _ = builder.try_init();
}

/// One completed request/response exchange
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub remote_addr: Option<SocketAddr>,
    pub timestamp: DateTime<Utc>,
    pub method: HttpMethod,
    pub target: String,
    pub version: HttpVersion,
    pub status: u16,
    pub body_length: usize,
}

impl AccessEntry {
    pub fn new(request: &HttpRequest, response: &HttpResponse) -> Self {
        Self {
            remote_addr: request.remote_addr(),
            timestamp: Utc::now(),
            method: request.method().clone(),
            target: request.uri().to_string(),
            version: request.version().clone(),
            status: response.status().as_u16(),
            body_length: response.body_bytes().len(),
        }
    }

    /// `addr - [date] "GET / HTTP/1.1" 200 512`
    pub fn common_log_line(&self) -> String {
        let addr = self.remote_addr.map(|a| a.ip().to_string()).unwrap_or_else(|| "-".into());
        format!(
            "{} - [{}] \"{} {} {}\" {} {}",
            addr,
            self.timestamp.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.target,
            self.version,
            self.status,
            self.body_length
        )
    }
}

/// Receives one entry per written response; must not block
pub trait AccessLog: Send + Sync {
    fn record(&self, entry: &AccessEntry);
}

/// Writes access lines through `log` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAccessLog;

impl AccessLog for LogAccessLog {
    fn record(&self, entry: &AccessEntry) {
        log::info!(target: ACCESS_TARGET, "{}", entry.common_log_line());
    }
}
