//! Configuration loading
//!
//! Loads kernel settings (or any serde type) from YAML, TOML, JSON, INI,
//! RON or JSON5 files.
//!
//! ## Features
//!
//! - Auto-detection of format from file extension
//! - Environment variable substitution (`${VAR}` and `$VAR` syntax)
//! - Environment variable overrides with a prefix (`PLEXUS_HOT_RELOAD__ENABLED`)

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config as Cfg, Environment, File, FileSourceString};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;

pub use config::FileFormat;

use crate::settings::KernelConfig;

/// Prefix for environment overrides of [`KernelConfig`]
pub const ENV_PREFIX: &str = "PLEXUS";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The source could not be parsed in its format
    #[error("invalid config: {0}")]
    Parse(String),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The parsed tree does not match the target type
    #[error("config does not match the expected shape: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// `${VAR}` (group 1) or `$VAR` (group 2)
static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)\b)")
        .expect("env var pattern is valid")
});

/// Detect configuration format from file extension
///
/// | Extension       | Format |
/// |-----------------|--------|
/// | `yaml`, `yml`   | YAML   |
/// | `toml`          | TOML   |
/// | `json`          | JSON   |
/// | `ini`           | INI    |
/// | `ron`           | RON    |
/// | `json5`         | JSON5  |
pub fn detect_format(path: impl AsRef<Path>) -> ConfigResult<FileFormat> {
    let path = path.as_ref();
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Err(ConfigError::UnsupportedFormat(format!(
            "{} has no file extension",
            path.display()
        )));
    };

    let format = match ext.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => FileFormat::Yaml,
        "toml" => FileFormat::Toml,
        "json" => FileFormat::Json,
        "ini" => FileFormat::Ini,
        "ron" => FileFormat::Ron,
        "json5" => FileFormat::Json5,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };
    Ok(format)
}

/// Replace `${VAR}` and `$VAR` references with the variable's value
///
/// Unset variables are left as written.
pub fn substitute_env_vars(content: &str) -> String {
    ENV_VAR.replace_all(content, env_value).into_owned()
}

fn env_value(caps: &Captures<'_>) -> String {
    let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
    std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
}

/// Read `path` and turn it into a config source, substituting variables
fn file_source(path: &Path) -> ConfigResult<File<FileSourceString, FileFormat>> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    Ok(File::from_str(&substitute_env_vars(&content), format))
}

fn deserialize<T: DeserializeOwned>(builder: ConfigBuilder<DefaultState>) -> ConfigResult<T> {
    builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, picking the format from its extension
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> ConfigResult<T> {
    deserialize(Cfg::builder().add_source(file_source(path.as_ref())?))
}

/// Load configuration from a string with explicit format
pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    let source = File::from_str(&substitute_env_vars(content), format);
    deserialize(Cfg::builder().add_source(source))
}

/// Load configuration from a file, then apply environment overrides
///
/// Variables use `prefix` and `__` for nesting, so `hot_reload.enabled` is
/// overridden by `PREFIX_HOT_RELOAD__ENABLED`.
pub fn load_with_env<T: DeserializeOwned>(
    path: impl AsRef<Path>,
    env_prefix: &str,
) -> ConfigResult<T> {
    let overrides = Environment::with_prefix(env_prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true);
    deserialize(
        Cfg::builder()
            .add_source(file_source(path.as_ref())?)
            .add_source(overrides),
    )
}

/// Load [`KernelConfig`] from a file, with `PLEXUS_*` environment overrides
pub fn load_kernel_config(path: impl AsRef<Path>) -> ConfigResult<KernelConfig> {
    load_with_env(path, ENV_PREFIX)
}
