//! Service directory data model
//!
//! A service is a named capability a plugin registers into the kernel's
//! [`ServiceRegistry`]. The implementation behind it is an opaque handle the
//! kernel stores verbatim and never introspects; consumers recover the
//! concrete type with a checked downcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod registry;

pub use registry::{RegistryStats, ServiceRegistry, SharedServiceRegistry};

/// Errors raised by the service directory
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Metadata is missing a required field
    #[error("Invalid service '{id}': {reason}")]
    InvalidService { id: String, reason: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Type-erased service implementation handle
///
/// The capability contract of a handle is defined per service `type`; a
/// consumer that knows the contract downcasts to the concrete type:
///
/// ```rust,ignore
/// let cache = registry
///     .get_implementation("cache.memory")
///     .and_then(|imp| imp.downcast::<MemoryCache>());
/// ```
#[derive(Clone)]
pub struct ServiceImplementation(Arc<dyn Any + Send + Sync>);

impl ServiceImplementation {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap an already shared value without re-allocating
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Checked downcast to a shared handle of the concrete type
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Checked downcast to a borrowed concrete value
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Whether two handles point at the same implementation
    pub fn ptr_eq(&self, other: &ServiceImplementation) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ServiceImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceImplementation(..)")
    }
}

/// Metadata of one registered service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetadata {
    /// Unique service identifier
    pub id: String,
    /// Human-readable name, also indexed
    pub name: String,
    pub version: Option<String>,
    /// Category of the service, also indexed
    #[serde(rename = "type")]
    pub service_type: String,
    /// Id of the plugin that owns this service
    pub provided_by: String,
    #[serde(skip)]
    pub implementation: ServiceImplementation,
    pub tags: BTreeSet<String>,
    pub dependencies: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Stamped by the registry when the service is inserted
    pub registered_at: DateTime<Utc>,
}

impl ServiceMetadata {
    pub fn new(
        id: &str,
        name: &str,
        service_type: &str,
        provided_by: &str,
        implementation: ServiceImplementation,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: None,
            service_type: service_type.to_string(),
            provided_by: provided_by.to_string(),
            implementation,
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            registered_at: Utc::now(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_dependency(mut self, service_id: &str) -> Self {
        self.dependencies.push(service_id.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Required fields are present
    pub fn validate(&self) -> ServiceResult<()> {
        let invalid = |reason: &str| ServiceError::InvalidService {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.service_type.trim().is_empty() {
            return Err(invalid("type must not be empty"));
        }
        if self.provided_by.trim().is_empty() {
            return Err(invalid("provided_by must not be empty"));
        }
        Ok(())
    }

    /// Whether this service passes every filter of `query`
    pub fn matches(&self, query: &ServiceQuery) -> bool {
        query
            .service_type
            .as_deref()
            .is_none_or(|t| self.service_type == t)
            && query
                .provided_by
                .as_deref()
                .is_none_or(|p| self.provided_by == p)
            && query.name.as_deref().is_none_or(|n| self.name == n)
            && query.tags.iter().all(|tag| self.tags.contains(tag))
    }
}

/// Filters for [`ServiceRegistry::query`]; unset filters match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceQuery {
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub provided_by: Option<String>,
    pub name: Option<String>,
    /// Every listed tag must be present on a match
    pub tags: Vec<String>,
}

impl ServiceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, service_type: &str) -> Self {
        self.service_type = Some(service_type.to_string());
        self
    }

    pub fn with_provider(mut self, plugin_id: &str) -> Self {
        self.provided_by = Some(plugin_id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.service_type.is_none()
            && self.provided_by.is_none()
            && self.name.is_none()
            && self.tags.is_empty()
    }
}
