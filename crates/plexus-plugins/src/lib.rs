//! Plexus plugins
//!
//! Hot-reload support for kernel plugins: a cache of tracked plugin modules,
//! state carried across versions, and reload listeners.

pub mod error_conversions;
pub mod hot_reload;

pub use hot_reload::{
    HotReloadManager, HotReloadResult, ListenerId, ModuleCacheEntry, ModuleInvalidator,
    NoopInvalidator, ReloadError, ReloadListener, ReloadListeners, ReloadOptions, StateValue,
};
pub use plexus_kernel::{
    HotReloadConfig, OpaqueStatePolicy, PluginDefinition, PluginError, PluginManifest,
    PluginResult,
};
