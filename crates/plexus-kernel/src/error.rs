//! Kernel error type
//!
//! # Usage
//!
//! ```rust,ignore
//! use plexus_kernel::error::{KernelError, KernelResult};
//! use error_stack::ResultExt;
//!
//! async fn enable_audit(kernel: &mut Kernel) -> KernelResult<()> {
//!     kernel
//!         .enable("audit")
//!         .await
//!         .attach("enabling the audit plugin at startup")?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Top-level error for kernel operations
///
/// Sub-module errors convert through `From`, so `?` lifts them. Callers get
/// a [`KernelResult`], which wraps this in an [`error_stack::Report`] that
/// collects context as it travels up.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    #[error("Plugin error: {0}")]
    Plugin(#[from] crate::plugin::PluginError),

    #[error("Service error: {0}")]
    Service(#[from] crate::service::ServiceError),

    /// Reload precondition failure, already rendered by the reload layer
    #[error("Reload error: {0}")]
    Reload(String),

    #[cfg(feature = "config")]
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
