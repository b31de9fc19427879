//! Kernel settings
//!
//! Plain serde structs; every field has a default so a partial config file
//! (or none at all) yields a usable kernel.

use serde::{Deserialize, Serialize};

use crate::plugin::HotReloadConfig;

/// Top-level kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub hot_reload: HotReloadConfig,
    pub logging: LoggingConfig,
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `plexus_runtime=debug`
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
