//! Module invalidation
//!
//! Before a new plugin version becomes current, the host gets a chance to
//! drop whatever it cached for the old one (compiled modules, resolved
//! imports, memoized lookups).

use async_trait::async_trait;

use plexus_kernel::plugin::{PluginManifest, PluginResult};

/// Drops host-side caches for a plugin that is about to be replaced
#[async_trait]
pub trait ModuleInvalidator: Send + Sync {
    /// Invalidate cached artifacts of `plugin_id` ahead of loading `manifest`
    async fn invalidate(&self, plugin_id: &str, manifest: &PluginManifest) -> PluginResult<()>;
}

/// Invalidator for hosts with nothing to invalidate
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl ModuleInvalidator for NoopInvalidator {
    async fn invalidate(&self, _plugin_id: &str, _manifest: &PluginManifest) -> PluginResult<()> {
        Ok(())
    }
}

/// Invalidator backed by a synchronous closure
pub struct FnInvalidator<F>(F);

impl<F> FnInvalidator<F>
where
    F: Fn(&str, &PluginManifest) -> PluginResult<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ModuleInvalidator for FnInvalidator<F>
where
    F: Fn(&str, &PluginManifest) -> PluginResult<()> + Send + Sync,
{
    async fn invalidate(&self, plugin_id: &str, manifest: &PluginManifest) -> PluginResult<()> {
        (self.0)(plugin_id, manifest)
    }
}
