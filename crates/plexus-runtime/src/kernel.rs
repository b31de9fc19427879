//! Kernel composition root
//!
//! [`Kernel`] owns the service directory, the lifecycle manager and the
//! hot-reload manager, and hands the directory to every plugin context.
//! Nothing here is global; hosts create as many kernels as they need.

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use plexus_kernel::config::load_kernel_config;
use plexus_kernel::error::{KernelError, KernelResult};
use plexus_kernel::metrics::{MetricsRecorder, NoopMetrics};
use plexus_kernel::plugin::{
    ContextFactory, DefaultContextFactory, PluginConfig, PluginDefinition, PluginEvent,
    PluginManifest,
};
use plexus_kernel::service::{ServiceRegistry, SharedServiceRegistry};
use plexus_kernel::settings::KernelConfig;
use plexus_plugins::hot_reload::{
    HotReloadManager, HotReloadResult, ModuleInvalidator, ReloadOptions, StateValue,
};

use crate::lifecycle::{PluginLifecycleManager, PluginSummary};

fn report<E: Into<KernelError>>(err: E) -> Report<KernelError> {
    Report::new(err.into())
}

/// Builder for [`Kernel`]
pub struct KernelBuilder {
    config: KernelConfig,
    services: Option<SharedServiceRegistry>,
    contexts: Option<Arc<dyn ContextFactory>>,
    plugin_configs: Vec<(String, PluginConfig)>,
    invalidator: Option<Arc<dyn ModuleInvalidator>>,
    metrics: Arc<dyn MetricsRecorder>,
    event_tx: Option<mpsc::Sender<PluginEvent>>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self {
            config: KernelConfig::default(),
            services: None,
            contexts: None,
            plugin_configs: Vec::new(),
            invalidator: None,
            metrics: Arc::new(NoopMetrics),
            event_tx: None,
        }
    }
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing service directory instead of creating one
    pub fn with_services(mut self, services: SharedServiceRegistry) -> Self {
        self.services = Some(services);
        self
    }

    /// Use a custom context factory; per-plugin configs are then ignored
    pub fn with_context_factory(mut self, contexts: Arc<dyn ContextFactory>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    /// Configuration handed to one plugin's hook contexts
    pub fn with_plugin_config(mut self, plugin_id: &str, config: PluginConfig) -> Self {
        self.plugin_configs.push((plugin_id.to_string(), config));
        self
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn ModuleInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Receive lifecycle and reload events on `tx`
    pub fn with_event_sender(mut self, tx: mpsc::Sender<PluginEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn build(self) -> Kernel {
        let services = self.services.unwrap_or_else(ServiceRegistry::shared);

        let contexts = match self.contexts {
            Some(contexts) => contexts,
            None => {
                let mut factory = DefaultContextFactory::new(services.clone());
                if let Some(tx) = &self.event_tx {
                    factory = factory.with_event_sender(tx.clone());
                }
                for (plugin_id, config) in self.plugin_configs {
                    factory = factory.with_plugin_config(&plugin_id, config);
                }
                Arc::new(factory) as Arc<dyn ContextFactory>
            }
        };

        let mut lifecycle = PluginLifecycleManager::new(contexts).with_metrics(self.metrics.clone());
        if let Some(tx) = &self.event_tx {
            lifecycle = lifecycle.with_event_sender(tx.clone());
        }

        let mut hot_reload =
            HotReloadManager::new(self.config.hot_reload.clone()).with_metrics(self.metrics.clone());
        if let Some(invalidator) = self.invalidator {
            hot_reload = hot_reload.with_invalidator(invalidator);
        }

        Kernel {
            config: self.config,
            services,
            lifecycle,
            hot_reload,
            event_tx: self.event_tx,
        }
    }
}

/// Plugin kernel
pub struct Kernel {
    config: KernelConfig,
    services: SharedServiceRegistry,
    lifecycle: PluginLifecycleManager,
    hot_reload: HotReloadManager,
    event_tx: Option<mpsc::Sender<PluginEvent>>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        KernelBuilder::new().with_config(config).build()
    }

    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// Kernel configured from a file, with `PLEXUS_*` environment overrides
    pub fn from_config_file(path: &str) -> KernelResult<Self> {
        let config = load_kernel_config(path)
            .map_err(report)
            .attach(format!("loading kernel config from {path}"))?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn services(&self) -> &SharedServiceRegistry {
        &self.services
    }

    pub fn lifecycle(&self) -> &PluginLifecycleManager {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut PluginLifecycleManager {
        &mut self.lifecycle
    }

    pub fn hot_reload(&self) -> &HotReloadManager {
        &self.hot_reload
    }

    pub fn hot_reload_mut(&mut self) -> &mut HotReloadManager {
        &mut self.hot_reload
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.lifecycle.summaries()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn register(&mut self, manifest: PluginManifest, definition: PluginDefinition) -> bool {
        self.lifecycle.register(manifest, definition)
    }

    pub async fn install(&mut self, plugin_id: &str) -> KernelResult<()> {
        self.lifecycle
            .install(plugin_id)
            .await
            .map_err(report)
            .attach(format!("installing plugin {plugin_id}"))
    }

    pub async fn enable(&mut self, plugin_id: &str) -> KernelResult<()> {
        self.lifecycle
            .enable(plugin_id)
            .await
            .map_err(report)
            .attach(format!("enabling plugin {plugin_id}"))
    }

    pub async fn load(&mut self, plugin_id: &str) -> KernelResult<()> {
        self.lifecycle
            .load(plugin_id)
            .await
            .map_err(report)
            .attach(format!("loading plugin {plugin_id}"))
    }

    pub async fn disable(&mut self, plugin_id: &str) -> KernelResult<()> {
        self.lifecycle
            .disable(plugin_id)
            .await
            .map_err(report)
            .attach(format!("disabling plugin {plugin_id}"))
    }

    /// Uninstall a plugin and drop every service it still provides
    pub async fn uninstall(&mut self, plugin_id: &str) -> KernelResult<()> {
        self.lifecycle
            .uninstall(plugin_id)
            .await
            .map_err(report)
            .attach(format!("uninstalling plugin {plugin_id}"))?;

        let removed = self.services.write().unregister_provider(plugin_id);
        if removed > 0 {
            info!(plugin_id, removed, "Removed services left by uninstalled plugin");
        }
        Ok(())
    }

    /// Enable every registered plugin, dependencies first
    pub async fn enable_all(&mut self) -> KernelResult<Vec<String>> {
        let order = self
            .lifecycle
            .load_order()
            .map_err(report)
            .attach("ordering plugins by dependency")?;
        for plugin_id in &order {
            self.enable(plugin_id).await?;
        }
        Ok(order)
    }

    /// Disable every enabled plugin, dependents first
    ///
    /// Failures are logged and skipped. Returns the IDs that were disabled.
    pub async fn shutdown(&mut self) -> Vec<String> {
        let mut order = self.lifecycle.load_order().unwrap_or_else(|e| {
            warn!(error = %e, "Shutting down without dependency order");
            self.lifecycle.plugin_ids()
        });
        order.reverse();

        let mut disabled = Vec::new();
        for plugin_id in order {
            if !self.lifecycle.is_enabled(&plugin_id) {
                continue;
            }
            match self.lifecycle.disable(&plugin_id).await {
                Ok(()) => disabled.push(plugin_id),
                Err(e) => warn!(plugin_id = %plugin_id, error = %e, "Failed to disable plugin during shutdown"),
            }
        }
        info!(count = disabled.len(), "Kernel shut down");
        disabled
    }

    // ------------------------------------------------------------------------
    // Hot reload
    // ------------------------------------------------------------------------

    /// Track a registered plugin for hot reload using its current manifest
    /// and hooks
    pub fn track(&mut self, plugin_id: &str, state: Option<StateValue>) -> KernelResult<()> {
        let entry = self
            .lifecycle
            .get(plugin_id)
            .ok_or_else(|| report(plexus_kernel::plugin::PluginError::NotFound(plugin_id.to_string())))
            .attach(format!("tracking plugin {plugin_id} for hot reload"))?;
        self.hot_reload.register(
            plugin_id,
            entry.manifest.clone(),
            entry.definition.clone(),
            state,
        );
        Ok(())
    }

    /// Reload with the configured default options
    pub async fn reload(
        &mut self,
        plugin_id: &str,
        manifest: PluginManifest,
        definition: PluginDefinition,
    ) -> KernelResult<HotReloadResult> {
        let options = self.hot_reload.default_options();
        self.reload_with(plugin_id, manifest, definition, options)
            .await
    }

    /// Reload a tracked plugin
    ///
    /// On success the lifecycle manager's entry for the same ID, if any, picks
    /// up the new manifest and hooks; its flags are unchanged.
    pub async fn reload_with(
        &mut self,
        plugin_id: &str,
        manifest: PluginManifest,
        definition: PluginDefinition,
        options: ReloadOptions,
    ) -> KernelResult<HotReloadResult> {
        let result = self
            .hot_reload
            .reload(plugin_id, manifest.clone(), definition.clone(), options)
            .await
            .map_err(report)
            .attach(format!("reloading plugin {plugin_id}"))?;

        if result.success && self.lifecycle.contains(plugin_id) {
            self.lifecycle
                .update_definition(plugin_id, manifest, definition)
                .map_err(report)?;
        }

        if let Some(tx) = &self.event_tx {
            let event = PluginEvent::Reloaded {
                plugin_id: plugin_id.to_string(),
                old_version: result.old_version.clone(),
                new_version: result.new_version.clone(),
                success: result.success,
            };
            if tx.try_send(event).is_err() {
                warn!(plugin_id, "Could not publish reload event");
            }
        }

        Ok(result)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("hot_reload", &self.hot_reload)
            .field("services", &self.services.read().len())
            .finish()
    }
}
