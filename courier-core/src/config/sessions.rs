//! Sessions configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Sessions configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Enable session management
    /// Env: COURIER_SESSION_ENABLED
    /// Default: true
    pub enabled: bool,

    /// Name of the cookie carrying the session id
    /// Env: COURIER_SESSION_COOKIE
    /// Default: "courier-session"
    pub cookie_name: String,

    /// Path attribute of the session cookie
    /// Env: COURIER_SESSION_COOKIE_PATH
    /// Default: "/"
    pub cookie_path: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: "courier-session".to_string(),
            cookie_path: "/".to_string(),
        }
    }
}

impl SessionsConfig {
    pub fn merge(&mut self, other: Self) {
        self.enabled = other.enabled;
        self.cookie_name = other.cookie_name;
        self.cookie_path = other.cookie_path;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(enabled) = env::var("COURIER_SESSION_ENABLED") {
            self.enabled = enabled.parse().unwrap_or(true);
        }

        if let Ok(name) = env::var("COURIER_SESSION_COOKIE") {
            self.cookie_name = name;
        }

        if let Ok(path) = env::var("COURIER_SESSION_COOKIE_PATH") {
            self.cookie_path = path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cookie_name.is_empty()
            || self.cookie_name.contains(|c: char| c.is_whitespace() || ";=,".contains(c))
        {
            bail!("Invalid cookie_name: '{}' is not a valid cookie name", self.cookie_name);
        }

        if !self.cookie_path.starts_with('/') {
            bail!("Invalid cookie_path: must start with '/'");
        }

        Ok(())
    }
}
