//! Cross-crate error conversions for plexus-plugins
//!
//! Implements `From<DomainError>` for the kernel error types so that
//! hot-reload errors from this crate convert with the `?` operator.

use plexus_kernel::error::KernelError;
use plexus_kernel::plugin::PluginError;

use crate::hot_reload::{ReloadError, StateCloneError};

// ============================================================================
// ReloadError → KernelError
// ============================================================================

impl From<ReloadError> for KernelError {
    fn from(err: ReloadError) -> Self {
        KernelError::Reload(err.to_string())
    }
}

// ============================================================================
// ReloadError → PluginError
// ============================================================================

impl From<ReloadError> for PluginError {
    fn from(err: ReloadError) -> Self {
        match err {
            ReloadError::NotTracked(id) => PluginError::NotFound(id),
            other => PluginError::Other(other.to_string()),
        }
    }
}

// ============================================================================
// StateCloneError → PluginError
// ============================================================================

impl From<StateCloneError> for PluginError {
    fn from(err: StateCloneError) -> Self {
        PluginError::Other(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
