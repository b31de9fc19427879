//! Plexus Testing Framework
//!
//! Provides test doubles for plugin hooks, module invalidation and metrics
//! so kernel behaviour can be asserted without a real host.

pub mod hooks;
pub mod invalidator;
pub mod metrics;

pub use hooks::{HookCall, RecordingHooks};
pub use invalidator::ScriptedInvalidator;
pub use metrics::RecordingMetrics;

use plexus_kernel::plugin::PluginManifest;

/// Manifest with a fixed plugin type, for tests that only care about IDs
/// and versions
pub fn manifest(id: &str, version: &str) -> PluginManifest {
    PluginManifest::new(id, version, "test")
}

#[macro_export]
macro_rules! assert_hooks_called {
    ($hooks:expr, [$($expected:expr),* $(,)?]) => {
        let calls = $hooks.labels().await;
        let expected: Vec<String> = vec![$($expected.to_string()),*];
        assert_eq!(
            calls, expected,
            "Expected hook calls {:?}, got {:?}",
            expected, calls
        );
    };
}
