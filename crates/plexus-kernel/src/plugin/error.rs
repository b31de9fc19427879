//! Typed errors for the plugin sub-system.

use thiserror::Error;

use super::definition::HookKind;

/// Errors that can occur during plugin lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The plugin id is not known to the component that was asked.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// A lifecycle hook returned an error; the transition was aborted.
    #[error("Plugin {plugin_id} {hook} hook failed: {message}")]
    HookFailed {
        /// Plugin whose hook failed.
        plugin_id: String,
        /// The hook slot that was running.
        hook: HookKind,
        /// Error reported by the hook.
        message: String,
    },

    /// A manifest version string could not be parsed.
    #[error("Invalid plugin version '{version}': {reason}")]
    InvalidVersion {
        /// The offending version string.
        version: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The manifest dependency graph contains a cycle.
    #[error("Circular dependency detected among: {0:?}")]
    CircularDependency(Vec<String>),

    /// A hook failed to register or look up a service.
    #[error("Service error: {0}")]
    Service(#[from] crate::service::ServiceError),

    /// Catch-all for errors that don't fit the above categories.
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Shorthand used by hooks that fail with a plain message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this error means the id was unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
