//! Tracked plugin modules

use chrono::{DateTime, Utc};

use plexus_kernel::plugin::{PluginDefinition, PluginManifest};

use super::state::StateValue;

/// What the hot-reload manager knows about one loaded plugin version
#[derive(Debug, Clone)]
pub struct ModuleCacheEntry {
    /// Manifest of the loaded version
    pub manifest: PluginManifest,
    /// Hooks of the loaded version
    pub definition: PluginDefinition,
    /// Preserved plugin state, if any
    pub state: Option<StateValue>,
    /// When this version became current
    pub loaded_at: DateTime<Utc>,
    /// Successful reloads since registration
    pub reload_count: u32,
}

impl ModuleCacheEntry {
    pub fn new(
        manifest: PluginManifest,
        definition: PluginDefinition,
        state: Option<StateValue>,
    ) -> Self {
        Self {
            manifest,
            definition,
            state,
            loaded_at: Utc::now(),
            reload_count: 0,
        }
    }

    /// Entry for the next version of this plugin
    pub(crate) fn succeed(
        &self,
        manifest: PluginManifest,
        definition: PluginDefinition,
        state: Option<StateValue>,
    ) -> Self {
        Self {
            manifest,
            definition,
            state,
            loaded_at: Utc::now(),
            reload_count: self.reload_count.saturating_add(1),
        }
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}
