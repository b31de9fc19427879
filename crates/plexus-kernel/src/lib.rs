//! Plexus kernel
//!
//! Plain data and contracts shared by every layer of the plugin runtime:
//! plugin manifests and lifecycle hooks, the per-plugin context, the
//! service directory, and the crate-level error types.

// plugin module
pub mod plugin;
pub use plugin::*;

// service module
pub mod service;
pub use service::*;

// error module
pub mod error;

// metrics module
pub mod metrics;
pub use metrics::{MetricsRecorder, NoopMetrics};

// settings module
pub mod settings;
pub use settings::{KernelConfig, LoggingConfig};

// config loader (multi-format)
#[cfg(feature = "config")]
pub mod config;
