//! Metrics traits for monitoring integration
//!
//! The kernel only reports timings and counters through [`MetricsRecorder`];
//! wiring them to a metrics backend is left to the host.

use std::time::Duration;

/// Sink for lifecycle and reload measurements
pub trait MetricsRecorder: Send + Sync {
    /// Record how long an operation took for a plugin
    fn record_duration(&self, name: &str, plugin_id: &str, duration: Duration);

    /// Count one occurrence of an event for a plugin
    fn increment(&self, name: &str, plugin_id: &str);
}

/// Recorder that drops every measurement
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_duration(&self, _name: &str, _plugin_id: &str, _duration: Duration) {}

    fn increment(&self, _name: &str, _plugin_id: &str) {}
}

/// Metric names reported by the kernel
pub mod names {
    pub const HOOK_DURATION: &str = "plugin.hook.duration";
    pub const HOOK_FAILED: &str = "plugin.hook.failed";
    pub const RELOAD_DURATION: &str = "hot_reload.duration";
    pub const RELOAD_FAILED: &str = "hot_reload.failed";
    pub const LISTENER_FAILED: &str = "hot_reload.listener_failed";
}
