//! Service registry
//!
//! Primary map from service id to metadata, plus secondary indexes by type,
//! provider, tag and name so filtered lookups never scan the whole
//! directory.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ServiceImplementation, ServiceMetadata, ServiceQuery, ServiceResult};

/// Registry handle shared between the kernel and plugin contexts
pub type SharedServiceRegistry = Arc<RwLock<ServiceRegistry>>;

/// Secondary index: attribute value -> ids of services carrying it
#[derive(Debug, Default)]
struct Index {
    buckets: HashMap<String, HashSet<String>>,
}

impl Index {
    fn insert(&mut self, key: &str, id: &str) {
        self.buckets
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string());
    }

    /// Remove `id` from the bucket for `key`, dropping the bucket once empty
    fn remove(&mut self, key: &str, id: &str) {
        if let Some(ids) = self.buckets.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    fn get(&self, key: &str) -> Option<&HashSet<String>> {
        self.buckets.get(key)
    }

    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// Directory of services registered by plugins
///
/// Lookups by id are O(1); `find_by_*` resolve the candidate set through an
/// index in O(1) and materialize it in O(k). Results of `find_by_*` and
/// [`query`](Self::query) are unordered.
///
/// The registry does no locking of its own. Mutation needs `&mut self`;
/// share it through [`SharedServiceRegistry`] when several owners need it.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceMetadata>,
    by_type: Index,
    by_provider: Index,
    by_tag: Index,
    by_name: Index,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind a shared lock
    pub fn shared() -> SharedServiceRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a service, replacing any previous service with the same id
    ///
    /// A replaced service is removed from every index before the new one is
    /// inserted, so no index keeps a stale membership.
    pub fn register(&mut self, mut service: ServiceMetadata) -> ServiceResult<()> {
        service.validate()?;

        if self.services.contains_key(&service.id) {
            debug!(service = %service.id, "Replacing registered service");
            self.unregister(&service.id);
        }

        service.registered_at = Utc::now();

        self.by_type.insert(&service.service_type, &service.id);
        self.by_provider.insert(&service.provided_by, &service.id);
        self.by_name.insert(&service.name, &service.id);
        for tag in &service.tags {
            self.by_tag.insert(tag, &service.id);
        }

        info!(
            service = %service.id,
            service_type = %service.service_type,
            provider = %service.provided_by,
            "Registered service"
        );
        self.services.insert(service.id.clone(), service);
        Ok(())
    }

    /// Remove a service and all of its index memberships
    ///
    /// Returns `false` if the id was not registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        let Some(service) = self.services.remove(id) else {
            return false;
        };

        self.by_type.remove(&service.service_type, id);
        self.by_provider.remove(&service.provided_by, id);
        self.by_name.remove(&service.name, id);
        for tag in &service.tags {
            self.by_tag.remove(tag, id);
        }

        debug!(service = %id, "Unregistered service");
        true
    }

    /// Register each service independently; returns how many succeeded
    pub fn register_batch<I>(&mut self, services: I) -> usize
    where
        I: IntoIterator<Item = ServiceMetadata>,
    {
        let mut registered = 0;
        for service in services {
            let id = service.id.clone();
            match self.register(service) {
                Ok(()) => registered += 1,
                Err(e) => warn!(service = %id, error = %e, "Skipping service in batch"),
            }
        }
        registered
    }

    /// Unregister each id independently; returns how many were present
    pub fn unregister_batch<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter(|id| self.unregister(id.as_ref()))
            .count()
    }

    /// Remove every service owned by a plugin; returns how many were removed
    pub fn unregister_provider(&mut self, plugin_id: &str) -> usize {
        let ids: Vec<String> = self
            .by_provider
            .get(plugin_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        self.unregister_batch(ids)
    }

    /// Clear all registrations
    pub fn clear(&mut self) {
        self.services.clear();
        self.by_type.clear();
        self.by_provider.clear();
        self.by_tag.clear();
        self.by_name.clear();
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, id: &str) -> Option<&ServiceMetadata> {
        self.services.get(id)
    }

    pub fn get_implementation(&self, id: &str) -> Option<&ServiceImplementation> {
        self.services.get(id).map(|s| &s.implementation)
    }

    pub fn has(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    pub fn find_by_type(&self, service_type: &str) -> Vec<&ServiceMetadata> {
        self.materialize(self.by_type.get(service_type))
    }

    pub fn find_by_provider(&self, plugin_id: &str) -> Vec<&ServiceMetadata> {
        self.materialize(self.by_provider.get(plugin_id))
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<&ServiceMetadata> {
        self.materialize(self.by_tag.get(tag))
    }

    pub fn find_by_name(&self, name: &str) -> Vec<&ServiceMetadata> {
        self.materialize(self.by_name.get(name))
    }

    /// Services matching every supplied filter
    ///
    /// The candidate set is seeded from the smallest index among the
    /// supplied filters (for several tags, the tag with the fewest members);
    /// the remaining filters are then checked per candidate. A filter whose
    /// index has no bucket short-circuits to an empty result. An empty query
    /// returns every service.
    pub fn query(&self, query: &ServiceQuery) -> Vec<&ServiceMetadata> {
        let mut supplied: Vec<Option<&HashSet<String>>> = Vec::new();
        if let Some(ref service_type) = query.service_type {
            supplied.push(self.by_type.get(service_type));
        }
        if let Some(ref provider) = query.provided_by {
            supplied.push(self.by_provider.get(provider));
        }
        if let Some(ref name) = query.name {
            supplied.push(self.by_name.get(name));
        }
        for tag in &query.tags {
            supplied.push(self.by_tag.get(tag));
        }

        if supplied.is_empty() {
            return self.list();
        }

        let Some(seeds) = supplied.into_iter().collect::<Option<Vec<_>>>() else {
            return Vec::new();
        };
        let Some(seed) = seeds.into_iter().min_by_key(|ids| ids.len()) else {
            return Vec::new();
        };

        seed.iter()
            .filter_map(|id| self.services.get(id))
            .filter(|service| service.matches(query))
            .collect()
    }

    /// All registered services
    pub fn list(&self) -> Vec<&ServiceMetadata> {
        self.services.values().collect()
    }

    /// All registered service ids
    pub fn ids(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Get registry statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_services: self.services.len(),
            types: self.by_type.bucket_count(),
            providers: self.by_provider.bucket_count(),
            tags: self.by_tag.bucket_count(),
            names: self.by_name.bucket_count(),
        }
    }

    fn materialize(&self, ids: Option<&HashSet<String>>) -> Vec<&ServiceMetadata> {
        ids.map(|ids| ids.iter().filter_map(|id| self.services.get(id)).collect())
            .unwrap_or_default()
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total registered services
    pub total_services: usize,
    /// Distinct service types
    pub types: usize,
    /// Distinct providing plugins
    pub providers: usize,
    /// Distinct tags
    pub tags: usize,
    /// Distinct names
    pub names: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceError;
    use std::collections::HashSet;

    fn service(id: &str, service_type: &str, provider: &str, tags: &[&str]) -> ServiceMetadata {
        ServiceMetadata::new(
            id,
            id,
            service_type,
            provider,
            ServiceImplementation::new(id.to_string()),
        )
        .with_tags(tags.iter().copied())
    }

    fn ids(services: Vec<&ServiceMetadata>) -> HashSet<String> {
        services.into_iter().map(|s| s.id.clone()).collect()
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_returns_stored_fields() {
        let mut registry = ServiceRegistry::new();
        let start = Utc::now();
        registry
            .register(
                service("db.pool", "database", "storage-plugin", &["sql"])
                    .with_version("2.1.0")
                    .with_dependency("config.reader")
                    .with_metadata("max_connections", serde_json::json!(16)),
            )
            .unwrap();
        let end = Utc::now();

        let stored = registry.get("db.pool").unwrap();
        assert_eq!(stored.name, "db.pool");
        assert_eq!(stored.version.as_deref(), Some("2.1.0"));
        assert_eq!(stored.service_type, "database");
        assert_eq!(stored.provided_by, "storage-plugin");
        assert!(stored.has_tag("sql"));
        assert_eq!(stored.dependencies, vec!["config.reader"]);
        assert_eq!(stored.metadata["max_connections"], 16);
        assert!(stored.registered_at >= start && stored.registered_at <= end);
        assert!(registry.has("db.pool"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_implementation_downcast() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(ServiceMetadata::new(
                "counter",
                "Counter",
                "metric",
                "core",
                ServiceImplementation::new(41_u64),
            ))
            .unwrap();

        let imp = registry.get_implementation("counter").unwrap();
        assert_eq!(imp.downcast_ref::<u64>(), Some(&41));
        assert_eq!(imp.downcast::<u64>().map(|v| *v), Some(41));
        assert!(imp.downcast::<String>().is_none());
        assert!(registry.get_implementation("missing").is_none());
    }

    #[test]
    fn test_reregister_moves_indexes() {
        let mut registry = ServiceRegistry::new();
        registry.register(service("s1", "A", "p", &["T1"])).unwrap();
        registry.register(service("s1", "B", "p", &["T2"])).unwrap();

        assert!(registry.find_by_type("A").is_empty());
        assert!(registry.find_by_tag("T1").is_empty());
        assert_eq!(ids(registry.find_by_type("B")), set(&["s1"]));
        assert_eq!(ids(registry.find_by_tag("T2")), set(&["s1"]));
        assert_eq!(registry.len(), 1);

        // empty buckets are dropped
        let stats = registry.stats();
        assert_eq!(stats.types, 1);
        assert_eq!(stats.tags, 1);
    }

    #[test]
    fn test_unregister_clears_every_index() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(service("s1", "A", "p1", &["x", "y"]))
            .unwrap();
        registry.register(service("s2", "A", "p1", &["x"])).unwrap();

        assert!(registry.unregister("s1"));
        assert!(!registry.unregister("s1"));

        assert!(registry.get("s1").is_none());
        assert_eq!(ids(registry.find_by_type("A")), set(&["s2"]));
        assert_eq!(ids(registry.find_by_provider("p1")), set(&["s2"]));
        assert_eq!(ids(registry.find_by_tag("x")), set(&["s2"]));
        assert!(registry.find_by_tag("y").is_empty());
        assert!(registry.find_by_name("s1").is_empty());
    }

    #[test]
    fn test_query_is_intersection() {
        let mut registry = ServiceRegistry::new();
        registry.register(service("1", "X", "p1", &["a", "b"])).unwrap();
        registry.register(service("2", "X", "p2", &["a"])).unwrap();
        registry.register(service("3", "Y", "p1", &["a", "b"])).unwrap();
        registry.register(service("4", "X", "p1", &["b"])).unwrap();
        registry
            .register(service("5", "X", "p2", &["a", "b", "c"]))
            .unwrap();

        let query = ServiceQuery::new().with_type("X").with_tag("a").with_tag("b");
        let expected: HashSet<String> = ids(registry.find_by_type("X"))
            .intersection(&ids(registry.find_by_tag("a")))
            .cloned()
            .collect::<HashSet<_>>()
            .intersection(&ids(registry.find_by_tag("b")))
            .cloned()
            .collect();

        assert_eq!(ids(registry.query(&query)), expected);
        assert_eq!(expected, set(&["1", "5"]));

        let by_provider = ServiceQuery::new().with_provider("p2").with_tag("c");
        assert_eq!(ids(registry.query(&by_provider)), set(&["5"]));
    }

    #[test]
    fn test_query_edge_cases() {
        let mut registry = ServiceRegistry::new();
        registry.register(service("1", "X", "p1", &["a"])).unwrap();
        registry.register(service("2", "Y", "p1", &[])).unwrap();

        assert_eq!(registry.query(&ServiceQuery::new()).len(), 2);
        assert!(
            registry
                .query(&ServiceQuery::new().with_type("X").with_tag("nope"))
                .is_empty()
        );
        assert_eq!(
            ids(registry.query(&ServiceQuery::new().with_name("2"))),
            set(&["2"])
        );
    }

    #[test]
    fn test_batch_counts_successes() {
        let mut registry = ServiceRegistry::new();
        let batch = vec![
            service("a", "T", "p", &[]),
            service("", "T", "p", &[]),
            service("b", "", "p", &[]),
            service("c", "T", "p", &[]),
        ];

        assert_eq!(registry.register_batch(batch), 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.unregister_batch(["a", "missing", "c"]), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_invalid_metadata() {
        let mut registry = ServiceRegistry::new();
        let err = registry.register(service("x", "T", " ", &[])).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidService { .. }));
        assert!(!registry.has("x"));
    }

    #[test]
    fn test_unregister_provider() {
        let mut registry = ServiceRegistry::new();
        registry.register(service("a", "T", "p1", &[])).unwrap();
        registry.register(service("b", "T", "p1", &[])).unwrap();
        registry.register(service("c", "T", "p2", &[])).unwrap();

        assert_eq!(registry.unregister_provider("p1"), 2);
        assert_eq!(registry.ids(), vec!["c".to_string()]);
        assert_eq!(registry.unregister_provider("p1"), 0);
    }
}
