use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod context;
pub mod definition;
pub mod error;
pub mod manifest;

pub use context::{ContextFactory, DefaultContextFactory, PluginConfig, PluginContext, PluginStorage};
pub use definition::{HookFuture, HookKind, LifecycleHook, PluginDefinition, hook_fn};
pub use error::PluginError;
pub use manifest::{PluginManifest, PluginVersion, major_component};

/// Plugin execution result type using the typed [`PluginError`].
pub type PluginResult<T> = Result<T, PluginError>;

// ============================================================================
// 插件状态 (Plugin status)
// ============================================================================

/// Lifecycle position of a registered plugin
///
/// `Unregistered` is never stored: a plugin in that state has no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PluginStatus {
    /// Known to the lifecycle manager, not installed
    Registered,
    /// Installed, not enabled
    Installed,
    /// Installed and enabled
    Enabled,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginStatus::Registered => write!(f, "Registered"),
            PluginStatus::Installed => write!(f, "Installed"),
            PluginStatus::Enabled => write!(f, "Enabled"),
        }
    }
}

// ============================================================================
// 热加载相关定义 (Hot-reload related definitions)
// ============================================================================

/// What a reload does with state values that cannot be copied structurally
///
/// Exhaustive: the state copier in `plexus-plugins` matches every policy, so
/// adding one is a breaking change there as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueStatePolicy {
    /// Fail the reload; the tracked entry stays as it was
    #[default]
    Reject,
    /// Share the opaque handle between old and new state and log a warning
    Share,
}

/// 热加载配置
/// Hot-reload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    /// Whether the hot-reload subsystem accepts reloads at all
    pub enabled: bool,
    /// Default for [`preserve_state`](Self::preserve_state) in reload options
    pub preserve_state: bool,
    /// Default for resolving the dependency list of a reloaded manifest
    pub reload_dependencies: bool,
    /// Carried to external retry wrappers; not enforced by the kernel
    pub max_retries: u32,
    /// Carried to external cancellation wrappers; not enforced by the kernel
    pub timeout_ms: Option<u64>,
    /// Handling of state values without a structural copy
    pub opaque_state: OpaqueStatePolicy,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preserve_state: true,
            reload_dependencies: false,
            max_retries: 0,
            timeout_ms: None,
            opaque_state: OpaqueStatePolicy::default(),
        }
    }
}

impl HotReloadConfig {
    /// 创建新配置
    /// Create new configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 设置是否保存状态
    /// Set whether to preserve state
    pub fn with_preserve_state(mut self, preserve: bool) -> Self {
        self.preserve_state = preserve;
        self
    }

    pub fn with_reload_dependencies(mut self, reload: bool) -> Self {
        self.reload_dependencies = reload;
        self
    }

    /// 设置最大尝试次数
    /// Set maximum attempt count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_opaque_state(mut self, policy: OpaqueStatePolicy) -> Self {
        self.opaque_state = policy;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// 插件事件
// ============================================================================

/// 插件事件
/// Plugin event
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PluginEvent {
    /// Plugin registered with the lifecycle manager
    Registered { plugin_id: String, version: String },
    /// Plugin status changed
    StatusChanged {
        plugin_id: String,
        old_status: Option<PluginStatus>,
        new_status: Option<PluginStatus>,
    },
    /// Plugin implementation replaced in place
    Reloaded {
        plugin_id: String,
        old_version: String,
        new_version: String,
        success: bool,
    },
    /// 插件错误
    /// Plugin error
    PluginError { plugin_id: String, error: String },
    /// 自定义事件
    /// Custom event
    Custom {
        plugin_id: String,
        event_type: String,
        data: serde_json::Value,
    },
}
