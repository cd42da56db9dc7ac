//! Configuration system for Courier
//!
//! Configuration values are resolved in the following order (highest
//! priority wins):
//!
//! 1. **Code** (builder calls on [`crate::server::CourierServer`] and the CLI)
//! 2. **Environment Variables** (`COURIER_*`)
//! 3. **Config File** (courier.toml)
//! 4. **Defaults**
//!
//! # Example
//!
//! ```no_run
//! use courier_core::config::CourierConfig;
//!
//! // Load with full supersedence
//! let config = CourierConfig::load()?;
//!
//! // Or load from specific file
//! let config = CourierConfig::from_file("courier.toml")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod files;
pub mod logging;
pub mod server;
pub mod sessions;

pub use files::FilesConfig;
pub use logging::LoggingConfig;
pub use server::ServerConfig;
pub use sessions::SessionsConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Courier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

impl CourierConfig {
    /// Load configuration with full supersedence chain from `courier.toml`
    pub fn load() -> Result<Self> {
        Self::load_from("courier.toml")
    }

    /// Load configuration from a specific file; a missing file means defaults
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = Self::default();

        if path.exists() {
            let file_config = Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.merge(file_config);
        }

        config.apply_env_vars();

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.as_ref().display()))
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.server.merge(other.server);
        self.files.merge(other.files);
        self.sessions.merge(other.sessions);
        self.logging.merge(other.logging);
    }

    /// Apply environment variables to configuration
    pub fn apply_env_vars(&mut self) {
        self.server.apply_env_vars();
        self.files.apply_env_vars();
        self.sessions.apply_env_vars();
        self.logging.apply_env_vars();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.files.validate()?;
        self.sessions.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
