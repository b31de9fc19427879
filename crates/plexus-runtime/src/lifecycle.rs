//! Plugin lifecycle management
//!
//! Drives each plugin through `Registered → Installed → Enabled` and back,
//! running the plugin's hooks on every transition. A hook error aborts the
//! transition and leaves the plugin's flags as they were.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{Instrument, debug, error, info, warn};

use plexus_kernel::metrics::{MetricsRecorder, NoopMetrics, names};
use plexus_kernel::plugin::{
    ContextFactory, HookKind, PluginDefinition, PluginError, PluginEvent, PluginManifest,
    PluginResult, PluginStatus,
};

/// A registered plugin
#[derive(Debug, Clone)]
pub struct PluginEntry {
    pub manifest: PluginManifest,
    pub definition: PluginDefinition,
    /// Never true while `installed` is false
    pub enabled: bool,
    pub installed: bool,
}

impl PluginEntry {
    fn new(manifest: PluginManifest, definition: PluginDefinition) -> Self {
        Self {
            manifest,
            definition,
            enabled: false,
            installed: false,
        }
    }

    pub fn status(&self) -> PluginStatus {
        if self.enabled {
            PluginStatus::Enabled
        } else if self.installed {
            PluginStatus::Installed
        } else {
            PluginStatus::Registered
        }
    }
}

/// Serializable view of a registered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub status: PluginStatus,
}

/// Plugin lifecycle manager
///
/// Mutating operations take `&mut self`, so operations on one manager are
/// serialized by the borrow checker. Hooks run inline; nothing is spawned.
pub struct PluginLifecycleManager {
    plugins: HashMap<String, PluginEntry>,
    contexts: Arc<dyn ContextFactory>,
    metrics: Arc<dyn MetricsRecorder>,
    event_tx: Option<mpsc::Sender<PluginEvent>>,
}

impl PluginLifecycleManager {
    pub fn new(contexts: Arc<dyn ContextFactory>) -> Self {
        Self {
            plugins: HashMap::new(),
            contexts,
            metrics: Arc::new(NoopMetrics),
            event_tx: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Publish registration and status changes on `tx`
    pub fn with_event_sender(mut self, tx: mpsc::Sender<PluginEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Register a plugin
    ///
    /// Returns `false` and leaves the existing entry untouched when the ID is
    /// already registered.
    pub fn register(&mut self, manifest: PluginManifest, definition: PluginDefinition) -> bool {
        if self.plugins.contains_key(&manifest.id) {
            warn!(plugin_id = %manifest.id, "Plugin already registered, ignoring");
            return false;
        }
        info!(plugin_id = %manifest.id, version = %manifest.version, "Plugin registered");
        self.emit(PluginEvent::Registered {
            plugin_id: manifest.id.clone(),
            version: manifest.version.clone(),
        });
        self.emit(PluginEvent::StatusChanged {
            plugin_id: manifest.id.clone(),
            old_status: None,
            new_status: Some(PluginStatus::Registered),
        });
        self.plugins
            .insert(manifest.id.clone(), PluginEntry::new(manifest, definition));
        true
    }

    /// Install a registered plugin, running `on_install`
    pub async fn install(&mut self, plugin_id: &str) -> PluginResult<()> {
        let entry = self.require(plugin_id)?;
        if entry.installed {
            warn!(plugin_id, "Plugin already installed");
            return Ok(());
        }

        self.run_hook(plugin_id, HookKind::Install).await?;
        self.transition(plugin_id, |entry| entry.installed = true);
        info!(plugin_id, "Plugin installed");
        Ok(())
    }

    /// Enable a plugin, installing it first when needed
    pub async fn enable(&mut self, plugin_id: &str) -> PluginResult<()> {
        let entry = self.require(plugin_id)?;
        if entry.enabled {
            warn!(plugin_id, "Plugin already enabled");
            return Ok(());
        }
        if !entry.installed {
            self.install(plugin_id).await?;
        }

        self.run_hook(plugin_id, HookKind::Enable).await?;
        self.transition(plugin_id, |entry| entry.enabled = true);
        info!(plugin_id, "Plugin enabled");
        Ok(())
    }

    /// Run `on_load` without touching the plugin's flags
    pub async fn load(&mut self, plugin_id: &str) -> PluginResult<()> {
        self.require(plugin_id)?;
        self.run_hook(plugin_id, HookKind::Load).await?;
        debug!(plugin_id, "Plugin loaded");
        Ok(())
    }

    /// Disable an enabled plugin, running `on_disable`
    pub async fn disable(&mut self, plugin_id: &str) -> PluginResult<()> {
        let entry = self.require(plugin_id)?;
        if !entry.enabled {
            warn!(plugin_id, "Plugin not enabled");
            return Ok(());
        }

        self.run_hook(plugin_id, HookKind::Disable).await?;
        self.transition(plugin_id, |entry| entry.enabled = false);
        info!(plugin_id, "Plugin disabled");
        Ok(())
    }

    /// Remove a plugin, disabling it first when enabled
    pub async fn uninstall(&mut self, plugin_id: &str) -> PluginResult<()> {
        let entry = self.require(plugin_id)?;
        if entry.enabled {
            self.disable(plugin_id).await?;
        }

        self.run_hook(plugin_id, HookKind::Uninstall).await?;
        if let Some(entry) = self.plugins.remove(plugin_id) {
            self.contexts.release(plugin_id);
            self.emit(PluginEvent::StatusChanged {
                plugin_id: plugin_id.to_string(),
                old_status: Some(entry.status()),
                new_status: None,
            });
        }
        info!(plugin_id, "Plugin uninstalled");
        Ok(())
    }

    /// Swap the manifest and hooks of a registered plugin, keeping its flags
    pub fn update_definition(
        &mut self,
        plugin_id: &str,
        manifest: PluginManifest,
        definition: PluginDefinition,
    ) -> PluginResult<()> {
        let entry = self
            .plugins
            .get_mut(plugin_id)
            .ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;
        debug!(
            plugin_id,
            old_version = %entry.manifest.version,
            new_version = %manifest.version,
            "Plugin definition replaced"
        );
        entry.manifest = manifest;
        entry.definition = definition;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get(&self, plugin_id: &str) -> Option<&PluginEntry> {
        self.plugins.get(plugin_id)
    }

    pub fn status(&self, plugin_id: &str) -> Option<PluginStatus> {
        self.plugins.get(plugin_id).map(PluginEntry::status)
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn is_installed(&self, plugin_id: &str) -> bool {
        self.plugins.get(plugin_id).is_some_and(|e| e.installed)
    }

    pub fn is_enabled(&self, plugin_id: &str) -> bool {
        self.plugins.get(plugin_id).is_some_and(|e| e.enabled)
    }

    /// Registered IDs in sorted order
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn enabled_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .plugins
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        let mut summaries: Vec<PluginSummary> = self
            .plugins
            .values()
            .map(|e| PluginSummary {
                id: e.manifest.id.clone(),
                version: e.manifest.version.clone(),
                plugin_type: e.manifest.plugin_type.clone(),
                status: e.status(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered IDs ordered so that every plugin follows its dependencies
    ///
    /// Dependencies on plugins that are not registered are ignored. Ties are
    /// broken by ID.
    pub fn load_order(&self) -> PluginResult<Vec<String>> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();

        for (id, entry) in &self.plugins {
            let mut count = 0;
            for dep in entry.manifest.dependencies.keys() {
                if self.plugins.contains_key(dep) {
                    dependents.entry(dep.as_str()).or_default().push(id.as_str());
                    count += 1;
                } else {
                    debug!(plugin_id = %id, dependency = %dep, "Dependency not registered, ignoring");
                }
            }
            pending.insert(id.as_str(), count);
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.plugins.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            pending.remove(id);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(order)
        } else {
            let cycle: Vec<String> = pending.keys().map(|id| id.to_string()).collect();
            error!(plugins = ?cycle, "Circular plugin dependency");
            Err(PluginError::CircularDependency(cycle))
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn require(&self, plugin_id: &str) -> PluginResult<&PluginEntry> {
        self.plugins
            .get(plugin_id)
            .ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))
    }

    fn transition(&mut self, plugin_id: &str, apply: impl FnOnce(&mut PluginEntry)) {
        let Some(entry) = self.plugins.get_mut(plugin_id) else {
            return;
        };
        let old_status = entry.status();
        apply(entry);
        let new_status = entry.status();
        if old_status != new_status {
            self.emit(PluginEvent::StatusChanged {
                plugin_id: plugin_id.to_string(),
                old_status: Some(old_status),
                new_status: Some(new_status),
            });
        }
    }

    async fn run_hook(&self, plugin_id: &str, kind: HookKind) -> PluginResult<()> {
        let entry = self.require(plugin_id)?;
        let Some(hook) = entry.definition.hook(kind).cloned() else {
            debug!(plugin_id, hook = %kind, "No hook defined, skipping");
            return Ok(());
        };
        let ctx = self.contexts.create(&entry.manifest);
        let span = ctx.span().clone();

        let start = Instant::now();
        let outcome = hook(ctx).instrument(span).await;
        self.metrics
            .record_duration(names::HOOK_DURATION, plugin_id, start.elapsed());

        outcome.map_err(|e| {
            error!(plugin_id, hook = %kind, error = %e, "Lifecycle hook failed");
            self.metrics.increment(names::HOOK_FAILED, plugin_id);
            self.emit(PluginEvent::PluginError {
                plugin_id: plugin_id.to_string(),
                error: e.to_string(),
            });
            PluginError::HookFailed {
                plugin_id: plugin_id.to_string(),
                hook: kind,
                message: e.to_string(),
            }
        })
    }

    fn emit(&self, event: PluginEvent) {
        let Some(ref tx) = self.event_tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Lifecycle event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Lifecycle event channel closed");
            }
        }
    }
}

impl std::fmt::Debug for PluginLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLifecycleManager")
            .field("plugins", &self.summaries())
            .field("has_event_sender", &self.event_tx.is_some())
            .finish()
    }
}
