//! Hot-reload manager
//!
//! Tracks the loaded version of each plugin and swaps in new versions,
//! carrying preserved state across.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use plexus_kernel::metrics::{MetricsRecorder, NoopMetrics, names};
use plexus_kernel::plugin::{
    HotReloadConfig, OpaqueStatePolicy, PluginDefinition, PluginManifest, PluginResult,
};

use super::cache::ModuleCacheEntry;
use super::invalidator::{ModuleInvalidator, NoopInvalidator};
use super::listeners::{ListenerId, ReloadListeners};
use super::state::{StateCloneError, StateValue, deep_clone};

/// Per-call reload options
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadOptions {
    /// Copy the current state into the new version
    pub preserve_state: bool,
    /// Report the new version's dependency IDs in the result
    pub reload_dependencies: bool,
    /// Carried for callers; the manager makes a single attempt
    pub max_retries: u32,
    /// Carried for callers; the manager does not time out invalidation
    pub timeout: Option<Duration>,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            preserve_state: true,
            reload_dependencies: false,
            max_retries: 0,
            timeout: None,
        }
    }
}

impl ReloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options matching the configured defaults
    pub fn from_config(config: &HotReloadConfig) -> Self {
        Self {
            preserve_state: config.preserve_state,
            reload_dependencies: config.reload_dependencies,
            max_retries: config.max_retries,
            timeout: config.timeout(),
        }
    }

    pub fn with_preserve_state(mut self, preserve: bool) -> Self {
        self.preserve_state = preserve;
        self
    }

    pub fn with_reload_dependencies(mut self, reload: bool) -> Self {
        self.reload_dependencies = reload;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of one reload attempt
#[derive(Debug, Clone, Serialize)]
pub struct HotReloadResult {
    pub success: bool,
    pub plugin_id: String,
    pub old_version: String,
    pub new_version: String,
    pub reloaded_at: DateTime<Utc>,
    /// Failure description when `success` is false
    pub error: Option<String>,
    /// Dependency IDs of the new version, when requested and successful
    pub dependencies: Option<Vec<String>>,
    /// Whether preserved state was carried into the new version
    pub state_preserved: bool,
    pub duration: Duration,
}

/// Reload error types
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("Plugin {0} is not tracked for hot reload")]
    NotTracked(String),

    #[error("Hot reload is disabled")]
    Disabled,

    #[error("State preservation failed: {0}")]
    StateNotCloneable(#[from] StateCloneError),

    #[error("Module invalidation failed for {plugin_id}: {message}")]
    InvalidationFailed { plugin_id: String, message: String },
}

/// Hot-reload manager
///
/// Mutating operations take `&mut self`; share the manager behind a lock
/// when several tasks need it.
pub struct HotReloadManager {
    config: HotReloadConfig,
    enabled: bool,
    modules: HashMap<String, ModuleCacheEntry>,
    invalidator: Arc<dyn ModuleInvalidator>,
    listeners: ReloadListeners,
    metrics: Arc<dyn MetricsRecorder>,
}

impl HotReloadManager {
    /// Create a new hot-reload manager
    pub fn new(config: HotReloadConfig) -> Self {
        Self {
            enabled: config.enabled,
            config,
            modules: HashMap::new(),
            invalidator: Arc::new(NoopInvalidator),
            listeners: ReloadListeners::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn ModuleInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &HotReloadConfig {
        &self.config
    }

    /// Reload options taken from the configuration
    pub fn default_options(&self) -> ReloadOptions {
        ReloadOptions::from_config(&self.config)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn reloading on or off at runtime
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "Hot reload toggled");
        }
        self.enabled = enabled;
    }

    /// Start tracking a plugin, replacing any previous entry for the ID
    pub fn register(
        &mut self,
        plugin_id: &str,
        manifest: PluginManifest,
        definition: PluginDefinition,
        state: Option<StateValue>,
    ) {
        let version = manifest.version.clone();
        let entry = ModuleCacheEntry::new(manifest, definition, state);
        if self.modules.insert(plugin_id.to_string(), entry).is_some() {
            warn!(plugin_id, version = %version, "Replacing tracked plugin");
        } else {
            debug!(plugin_id, version = %version, "Tracking plugin for hot reload");
        }
    }

    /// Stop tracking a plugin; its listeners stay registered
    pub fn unregister(&mut self, plugin_id: &str) -> Option<ModuleCacheEntry> {
        let removed = self.modules.remove(plugin_id);
        if removed.is_some() {
            debug!(plugin_id, "Plugin no longer tracked for hot reload");
        }
        removed
    }

    pub fn is_tracked(&self, plugin_id: &str) -> bool {
        self.modules.contains_key(plugin_id)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn entry(&self, plugin_id: &str) -> Option<&ModuleCacheEntry> {
        self.modules.get(plugin_id)
    }

    /// Whether a reload of `plugin_id` would be attempted
    pub fn can_reload(&self, plugin_id: &str) -> bool {
        self.enabled && self.modules.contains_key(plugin_id)
    }

    pub fn get_state(&self, plugin_id: &str) -> Option<&StateValue> {
        self.modules.get(plugin_id).and_then(|e| e.state.as_ref())
    }

    /// Replace the preserved state of a tracked plugin
    pub fn set_state(
        &mut self,
        plugin_id: &str,
        state: Option<StateValue>,
    ) -> Result<(), ReloadError> {
        let entry = self
            .modules
            .get_mut(plugin_id)
            .ok_or_else(|| ReloadError::NotTracked(plugin_id.to_string()))?;
        entry.state = state;
        Ok(())
    }

    /// Handle to the listener set
    pub fn listeners(&self) -> ReloadListeners {
        self.listeners.clone()
    }

    /// Register a listener called after every reload attempt of `plugin_id`
    pub fn on_reload<F>(&self, plugin_id: &str, listener: F) -> ListenerId
    where
        F: Fn(&HotReloadResult) -> PluginResult<()> + Send + Sync + 'static,
    {
        self.listeners.add(plugin_id, listener)
    }

    pub fn off_reload(&self, plugin_id: &str, id: ListenerId) -> bool {
        self.listeners.remove(plugin_id, id)
    }

    /// Replace the tracked version of a plugin
    ///
    /// Returns `Err` only when the reload cannot start (manager disabled or
    /// plugin not tracked). Failures during the reload come back as a result
    /// with `success == false`, and the tracked entry is left untouched.
    /// Listeners are notified in both cases.
    pub async fn reload(
        &mut self,
        plugin_id: &str,
        new_manifest: PluginManifest,
        new_definition: PluginDefinition,
        options: ReloadOptions,
    ) -> Result<HotReloadResult, ReloadError> {
        let start = Instant::now();

        if !self.enabled {
            return Err(ReloadError::Disabled);
        }
        let current = self
            .modules
            .get(plugin_id)
            .ok_or_else(|| ReloadError::NotTracked(plugin_id.to_string()))?;

        let old_version = current.manifest.version.clone();
        let new_version = new_manifest.version.clone();

        if new_manifest.id != plugin_id {
            warn!(
                plugin_id,
                manifest_id = %new_manifest.id,
                "Reloading with a manifest for a different plugin ID"
            );
        }
        if !current.manifest.is_major_compatible(&new_manifest) {
            warn!(
                plugin_id,
                old_version = %old_version,
                new_version = %new_version,
                "Major version changed; preserved state may not match the new version"
            );
        }

        info!(plugin_id, old_version = %old_version, new_version = %new_version, "Reloading plugin");

        let prepared = Self::prepare_state(current, &options, self.config.opaque_state);
        let outcome = match prepared {
            Ok(state) => self
                .invalidator
                .invalidate(plugin_id, &new_manifest)
                .await
                .map(|()| state)
                .map_err(|e| ReloadError::InvalidationFailed {
                    plugin_id: plugin_id.to_string(),
                    message: e.to_string(),
                }),
            Err(e) => Err(e),
        };

        let mut result = HotReloadResult {
            success: false,
            plugin_id: plugin_id.to_string(),
            old_version,
            new_version,
            reloaded_at: Utc::now(),
            error: None,
            dependencies: None,
            state_preserved: false,
            duration: Duration::ZERO,
        };

        match outcome {
            Ok(state) => {
                if options.reload_dependencies {
                    result.dependencies = Some(new_manifest.dependency_ids());
                }
                result.state_preserved = state.is_some();
                result.success = true;

                let next = match self.modules.get(plugin_id) {
                    Some(previous) => previous.succeed(new_manifest, new_definition, state),
                    None => ModuleCacheEntry::new(new_manifest, new_definition, state),
                };
                self.modules.insert(plugin_id.to_string(), next);

                info!(
                    plugin_id,
                    version = %result.new_version,
                    state_preserved = result.state_preserved,
                    "Plugin reloaded"
                );
            }
            Err(e) => {
                warn!(plugin_id, error = %e, "Plugin reload failed; keeping current version");
                result.error = Some(e.to_string());
                self.metrics.increment(names::RELOAD_FAILED, plugin_id);
            }
        }

        result.duration = start.elapsed();
        self.metrics
            .record_duration(names::RELOAD_DURATION, plugin_id, result.duration);

        let failed = self.listeners.notify(&result);
        for _ in 0..failed {
            self.metrics.increment(names::LISTENER_FAILED, plugin_id);
        }

        Ok(result)
    }

    fn prepare_state(
        current: &ModuleCacheEntry,
        options: &ReloadOptions,
        policy: OpaqueStatePolicy,
    ) -> Result<Option<StateValue>, ReloadError> {
        if !options.preserve_state {
            return Ok(None);
        }
        match &current.state {
            Some(state) => Ok(Some(deep_clone(state, policy)?)),
            None => Ok(None),
        }
    }
}

impl Default for HotReloadManager {
    fn default() -> Self {
        Self::new(HotReloadConfig::default())
    }
}

impl std::fmt::Debug for HotReloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloadManager")
            .field("enabled", &self.enabled)
            .field("tracked", &self.tracked_ids())
            .field("listeners", &self.listeners)
            .finish()
    }
}
