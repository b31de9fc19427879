//! Per-plugin execution context and the factory that builds it

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{Span, debug, warn};

use super::{PluginError, PluginEvent, PluginManifest, PluginResult};
use crate::service::{ServiceRegistry, SharedServiceRegistry};

/// Per-plugin key/value storage, shared by every context handed to the same plugin
pub type PluginStorage = Arc<RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>>;

/// 插件配置
/// Plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    /// 配置项
    /// Configuration items
    pub settings: HashMap<String, serde_json::Value>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.settings.insert(key.to_string(), v);
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)
    }
}

/// 插件执行上下文
/// Plugin execution context
///
/// Cloning is cheap: storage, the service directory and the event channel
/// are shared handles.
#[derive(Clone)]
pub struct PluginContext {
    /// Plugin this context belongs to
    pub plugin_id: String,
    /// Manifest the context was created from
    pub manifest: Arc<PluginManifest>,
    /// Plugin configuration
    pub config: PluginConfig,
    storage: PluginStorage,
    services: SharedServiceRegistry,
    event_tx: Option<mpsc::Sender<PluginEvent>>,
    span: Span,
}

impl PluginContext {
    /// Context with private storage and an empty service directory
    pub fn new(manifest: PluginManifest) -> Self {
        let span = tracing::info_span!("plugin", id = %manifest.id, version = %manifest.version);
        Self {
            plugin_id: manifest.id.clone(),
            manifest: Arc::new(manifest),
            config: PluginConfig::new(),
            storage: Arc::new(RwLock::new(HashMap::new())),
            services: ServiceRegistry::shared(),
            event_tx: None,
            span,
        }
    }

    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_services(mut self, services: SharedServiceRegistry) -> Self {
        self.services = services;
        self
    }

    pub fn with_storage(mut self, storage: PluginStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_event_sender(mut self, tx: mpsc::Sender<PluginEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Service directory the plugin registers its services into
    pub fn services(&self) -> &SharedServiceRegistry {
        &self.services
    }

    /// Tracing span scoped to this plugin; enter it to tag log lines
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// 获取共享状态
    /// Get shared state
    pub async fn get_state<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let state = self.storage.read().await;
        state.get(key).and_then(|v| v.downcast_ref::<T>().cloned())
    }

    /// 设置共享状态
    /// Set shared state
    pub async fn set_state<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T) {
        let mut state = self.storage.write().await;
        state.insert(key.to_string(), Box::new(value));
    }

    /// 发送插件事件
    /// Emit plugin event
    pub async fn emit_event(&self, event: PluginEvent) -> PluginResult<()> {
        if let Some(ref tx) = self.event_tx {
            tx.send(event)
                .await
                .map_err(|e| PluginError::Other(format!("Failed to send event: {}", e)))?;
        }
        Ok(())
    }

    /// Non-blocking variant used by the kernel itself; a full or closed
    /// channel drops the event.
    pub fn try_emit_event(&self, event: PluginEvent) {
        let Some(ref tx) = self.event_tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(plugin = %self.plugin_id, ?event, "Plugin event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(plugin = %self.plugin_id, "Plugin event channel closed");
            }
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("version", &self.manifest.version)
            .field("config", &self.config)
            .field("has_event_sender", &self.event_tx.is_some())
            .finish()
    }
}

/// Builds the [`PluginContext`] handed to lifecycle hooks
pub trait ContextFactory: Send + Sync {
    fn create(&self, manifest: &PluginManifest) -> PluginContext;

    /// Called once a plugin is uninstalled
    fn release(&self, _plugin_id: &str) {}
}

/// Context factory backed by one shared service directory
///
/// Storage is kept per plugin id, so state written in `on_install` is
/// visible again in `on_enable`.
pub struct DefaultContextFactory {
    services: SharedServiceRegistry,
    event_tx: Option<mpsc::Sender<PluginEvent>>,
    configs: HashMap<String, PluginConfig>,
    storages: Mutex<HashMap<String, PluginStorage>>,
}

impl DefaultContextFactory {
    pub fn new(services: SharedServiceRegistry) -> Self {
        Self {
            services,
            event_tx: None,
            configs: HashMap::new(),
            storages: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_event_sender(mut self, tx: mpsc::Sender<PluginEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Configuration handed to a specific plugin's contexts
    pub fn with_plugin_config(mut self, plugin_id: &str, config: PluginConfig) -> Self {
        self.configs.insert(plugin_id.to_string(), config);
        self
    }

    /// Drop the storage kept for a plugin
    pub fn forget(&self, plugin_id: &str) {
        self.storages.lock().remove(plugin_id);
    }

    fn storage_for(&self, plugin_id: &str) -> PluginStorage {
        self.storages
            .lock()
            .entry(plugin_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())))
            .clone()
    }
}

impl ContextFactory for DefaultContextFactory {
    fn create(&self, manifest: &PluginManifest) -> PluginContext {
        let mut ctx = PluginContext::new(manifest.clone())
            .with_services(self.services.clone())
            .with_storage(self.storage_for(&manifest.id))
            .with_config(self.configs.get(&manifest.id).cloned().unwrap_or_default());
        if let Some(ref tx) = self.event_tx {
            ctx = ctx.with_event_sender(tx.clone());
        }
        ctx
    }

    fn release(&self, plugin_id: &str) {
        self.forget(plugin_id);
    }
}

impl std::fmt::Debug for DefaultContextFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultContextFactory")
            .field("configured_plugins", &self.configs.keys().collect::<Vec<_>>())
            .field("has_event_sender", &self.event_tx.is_some())
            .finish()
    }
}
