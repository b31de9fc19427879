//! Hot-reload plugin support module
//!
//! Provides hot-reload capabilities for plugins:
//! - Tracking of the loaded manifest and definition per plugin
//! - State preservation across reloads, deep-copied into the new version
//! - Pluggable module invalidation
//! - Per-plugin reload listeners

mod cache;
mod invalidator;
mod listeners;
mod manager;
mod state;

pub use cache::ModuleCacheEntry;
pub use invalidator::{FnInvalidator, ModuleInvalidator, NoopInvalidator};
pub use listeners::{ListenerId, ReloadListener, ReloadListeners};
pub use manager::{HotReloadManager, HotReloadResult, ReloadError, ReloadOptions};
pub use state::{OpaqueValue, StateCloneError, StateValue, deep_clone};

// Re-export kernel hot reload settings
pub use plexus_kernel::plugin::{HotReloadConfig, OpaqueStatePolicy};
