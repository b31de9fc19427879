//! Structured logging setup

use tracing_subscriber::EnvFilter;

use plexus_kernel::settings::LoggingConfig;

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install a global `tracing` subscriber
///
/// Returns `false` when a subscriber was already installed, which is the
/// normal case in tests and when the host sets up its own.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Logging initialised");
    }
    installed
}
