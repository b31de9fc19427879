//! Plexus runtime
//!
//! Plugin lifecycle management and the [`Kernel`] composition root that
//! ties the service directory, lifecycle manager and hot-reload manager
//! together.
//!
//! ```rust,ignore
//! use plexus_runtime::{Kernel, init_logging};
//!
//! let mut kernel = Kernel::from_config_file("plexus.toml")?;
//! init_logging(&kernel.config().logging);
//! kernel.register(manifest, definition);
//! kernel.enable_all().await?;
//! ```

pub mod kernel;
pub mod lifecycle;
pub mod logging;

pub use kernel::{Kernel, KernelBuilder};
pub use lifecycle::{PluginEntry, PluginLifecycleManager, PluginSummary};
pub use logging::init_logging;

pub use plexus_kernel::error::{KernelError, KernelResult};
pub use plexus_kernel::metrics::{MetricsRecorder, NoopMetrics};
pub use plexus_kernel::plugin::{
    ContextFactory, DefaultContextFactory, HookKind, PluginConfig, PluginContext,
    PluginDefinition, PluginError, PluginEvent, PluginManifest, PluginResult, PluginStatus,
};
pub use plexus_kernel::service::{
    ServiceImplementation, ServiceMetadata, ServiceQuery, ServiceRegistry, SharedServiceRegistry,
};
pub use plexus_kernel::settings::{KernelConfig, LoggingConfig};
pub use plexus_plugins::hot_reload::{
    HotReloadManager, HotReloadResult, ModuleInvalidator, ReloadOptions, StateValue,
};
