//! Upload and request body configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Body decoding configuration, shared read-only by every body assembler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory receiving uploads that outgrow `memory_threshold`
    /// Env: COURIER_TEMP_DIRECTORY
    /// Default: the system temp directory
    pub temp_directory: PathBuf,

    /// Remove spilled upload files when the upload is dropped
    /// Env: COURIER_DELETE_TEMP_ON_EXIT
    /// Default: true
    pub delete_temp_on_exit: bool,

    /// Largest file part kept in memory, in bytes
    /// Env: COURIER_MEMORY_THRESHOLD
    /// Default: 65536 (64KB)
    pub memory_threshold: usize,

    /// Largest accepted request body, in bytes
    /// Env: COURIER_MAX_BODY_SIZE
    /// Default: 10485760 (10MB)
    pub max_body_size: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            temp_directory: env::temp_dir(),
            delete_temp_on_exit: true,
            memory_threshold: 64 * 1024,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

impl FilesConfig {
    pub fn merge(&mut self, other: Self) {
        self.temp_directory = other.temp_directory;
        self.delete_temp_on_exit = other.delete_temp_on_exit;
        self.memory_threshold = other.memory_threshold;
        self.max_body_size = other.max_body_size;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(dir) = env::var("COURIER_TEMP_DIRECTORY") {
            self.temp_directory = PathBuf::from(dir);
        }

        if let Ok(delete) = env::var("COURIER_DELETE_TEMP_ON_EXIT") {
            self.delete_temp_on_exit = delete.parse().unwrap_or(true);
        }

        if let Ok(threshold) = env::var("COURIER_MEMORY_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.memory_threshold = t;
            }
        }

        if let Ok(size) = env::var("COURIER_MAX_BODY_SIZE") {
            if let Ok(s) = size.parse() {
                self.max_body_size = s;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_body_size == 0 {
            bail!("Invalid max_body_size: must be greater than 0");
        }

        if self.temp_directory.as_os_str().is_empty() {
            bail!("Invalid temp_directory: path cannot be empty");
        }

        if self.temp_directory.exists() && !self.temp_directory.is_dir() {
            bail!("Invalid temp_directory: {} is not a directory", self.temp_directory.display());
        }

        Ok(())
    }
}
