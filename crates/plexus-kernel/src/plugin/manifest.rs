//! Plugin manifest and version parsing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{PluginError, PluginResult};

/// Plugin version information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Pre-release tag (e.g., "alpha", "beta")
    pub prerelease: Option<String>,
    /// Build metadata
    pub build: Option<String>,
}

impl PluginVersion {
    /// Create a new version
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Parse from string (e.g., "1.2.3-alpha+build123")
    pub fn parse(version: &str) -> PluginResult<Self> {
        let invalid = |reason: &str| PluginError::InvalidVersion {
            version: version.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = version.trim();

        let (version_pre, build) = match trimmed.split_once('+') {
            Some((head, build)) => (head, Some(build.to_string())),
            None => (trimmed, None),
        };

        let (version_core, prerelease) = match version_pre.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (version_pre, None),
        };

        let parts: Vec<&str> = version_core.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid("expected major.minor.patch"));
        }

        let component = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| invalid("version components must be unsigned integers"))
        };

        Ok(Self {
            major: component(parts[0])?,
            minor: component(parts[1])?,
            patch: component(parts[2])?,
            prerelease,
            build,
        })
    }

    /// Check if this version is compatible with another (same major version)
    pub fn is_compatible(&self, other: &PluginVersion) -> bool {
        self.major == other.major
    }
}

/// Returns the leading (major) component of a version string.
///
/// Works on unparseable strings too, so a malformed version can still be
/// compared against another one.
pub fn major_component(version: &str) -> &str {
    version.trim().split('.').next().unwrap_or_default()
}

/// Static identity, version and dependency declaration of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin identifier
    pub id: String,
    /// Version string, "major.minor.patch[-pre]"
    pub version: String,
    /// Plugin category
    #[serde(rename = "type")]
    pub plugin_type: String,
    /// Declared dependencies: plugin id -> version requirement
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

impl PluginManifest {
    pub fn new(id: &str, version: &str, plugin_type: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            plugin_type: plugin_type.to_string(),
            dependencies: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_dependency(mut self, id: &str, requirement: &str) -> Self {
        self.dependencies
            .insert(id.to_string(), requirement.to_string());
        self
    }

    /// Parsed version of this manifest
    pub fn parsed_version(&self) -> PluginResult<PluginVersion> {
        PluginVersion::parse(&self.version)
    }

    /// Flat list of declared dependency ids, in id order
    pub fn dependency_ids(&self) -> Vec<String> {
        self.dependencies.keys().cloned().collect()
    }

    /// Whether both manifests share a major version
    ///
    /// Versions are compared numerically when both parse; otherwise their
    /// leading components are compared as text.
    pub fn is_major_compatible(&self, other: &PluginManifest) -> bool {
        match (self.parsed_version(), other.parsed_version()) {
            (Ok(ours), Ok(theirs)) => ours.is_compatible(&theirs),
            _ => major_component(&self.version) == major_component(&other.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v = PluginVersion::parse("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));

        let v = PluginVersion::parse("1.2.3-alpha").unwrap();
        assert_eq!(v.prerelease, Some("alpha".to_string()));

        let v = PluginVersion::parse("1.2.3-beta+build123").unwrap();
        assert_eq!(v.prerelease, Some("beta".to_string()));
        assert_eq!(v.build, Some("build123".to_string()));
    }

    #[test]
    fn test_version_parse_rejects_malformed() {
        assert!(PluginVersion::parse("1.2").is_err());
        assert!(PluginVersion::parse("1.x.3").is_err());
        assert!(matches!(
            PluginVersion::parse(""),
            Err(PluginError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = PluginVersion::new(1, 0, 0);
        assert!(v1.is_compatible(&PluginVersion::new(1, 1, 0)));
        assert!(!v1.is_compatible(&PluginVersion::new(2, 0, 0)));
    }

    #[test]
    fn test_manifest_major_compatibility() {
        let v1 = PluginManifest::new("p", "1.0.0", "widget");
        assert!(v1.is_major_compatible(&v1.clone().with_version("1.9.2-beta")));
        assert!(!v1.is_major_compatible(&v1.clone().with_version("2.0.0")));
        // numeric comparison ignores leading zeros
        assert!(v1.is_major_compatible(&v1.clone().with_version("01.4.0")));
    }

    #[test]
    fn test_manifest_major_compatibility_of_malformed_versions() {
        let nightly = PluginManifest::new("p", "next.1", "widget");
        assert!(nightly.is_major_compatible(&nightly.clone().with_version("next.2")));
        assert!(!nightly.is_major_compatible(&nightly.clone().with_version("1.0.0")));
    }

    #[test]
    fn test_manifest_deserializes_type_field() {
        let manifest: PluginManifest = serde_json::from_value(serde_json::json!({
            "id": "audit",
            "version": "0.3.1",
            "type": "observer",
            "dependencies": { "storage": "^1.0", "events": "*" }
        }))
        .unwrap();

        assert_eq!(manifest.plugin_type, "observer");
        assert_eq!(manifest.dependency_ids(), vec!["events", "storage"]);
        assert_eq!(manifest.parsed_version().unwrap(), PluginVersion::new(0, 3, 1));
    }
}
