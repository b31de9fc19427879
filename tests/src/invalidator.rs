use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_kernel::plugin::{PluginError, PluginManifest, PluginResult};
use plexus_plugins::hot_reload::ModuleInvalidator;

/// Module invalidator whose outcome is set by the test
#[derive(Clone, Default)]
pub struct ScriptedInvalidator {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    /// `(plugin_id, version)` of every invalidation request
    pub requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following invalidation until reset
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleInvalidator for ScriptedInvalidator {
    async fn invalidate(&self, plugin_id: &str, manifest: &PluginManifest) -> PluginResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .push((plugin_id.to_string(), manifest.version.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(PluginError::other(format!(
                "cache for {plugin_id} could not be invalidated"
            )));
        }
        Ok(())
    }
}
