//! Reload listeners
//!
//! Listeners are stored per plugin and called after every reload attempt.
//! Dispatch works on a snapshot taken under the lock, so a listener may
//! add or remove listeners without deadlocking.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use plexus_kernel::plugin::PluginResult;

use super::manager::HotReloadResult;

/// Callback invoked with the outcome of a reload
pub type ReloadListener = Arc<dyn Fn(&HotReloadResult) -> PluginResult<()> + Send + Sync>;

/// Handle returned when a listener is added, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    by_plugin: HashMap<String, Vec<(ListenerId, ReloadListener)>>,
}

/// Shared set of reload listeners keyed by plugin ID
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ReloadListeners {
    inner: Arc<Mutex<ListenerTable>>,
}

impl ReloadListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener for `plugin_id`
    pub fn add<F>(&self, plugin_id: &str, listener: F) -> ListenerId
    where
        F: Fn(&HotReloadResult) -> PluginResult<()> + Send + Sync + 'static,
    {
        let mut table = self.inner.lock();
        let id = ListenerId(table.next_id);
        table.next_id += 1;
        table
            .by_plugin
            .entry(plugin_id.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        debug!(plugin_id, listener = id.0, "Reload listener added");
        id
    }

    /// Remove a listener; returns `false` when it was not registered
    pub fn remove(&self, plugin_id: &str, id: ListenerId) -> bool {
        let mut table = self.inner.lock();
        let Some(listeners) = table.by_plugin.get_mut(plugin_id) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            table.by_plugin.remove(plugin_id);
        }
        removed
    }

    /// Drop every listener of a plugin
    pub fn clear(&self, plugin_id: &str) {
        self.inner.lock().by_plugin.remove(plugin_id);
    }

    pub fn count(&self, plugin_id: &str) -> usize {
        self.inner
            .lock()
            .by_plugin
            .get(plugin_id)
            .map_or(0, Vec::len)
    }

    fn snapshot(&self, plugin_id: &str) -> Vec<ReloadListener> {
        self.inner
            .lock()
            .by_plugin
            .get(plugin_id)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// Call every listener of `result.plugin_id`
    ///
    /// Errors and panics are logged and never reach the caller. Returns the
    /// number of listeners that failed.
    pub fn notify(&self, result: &HotReloadResult) -> usize {
        let mut failed = 0;
        for listener in self.snapshot(&result.plugin_id) {
            match catch_unwind(AssertUnwindSafe(|| listener(result))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    error!(plugin_id = %result.plugin_id, error = %e, "Reload listener failed");
                }
                Err(_) => {
                    failed += 1;
                    error!(plugin_id = %result.plugin_id, "Reload listener panicked");
                }
            }
        }
        failed
    }
}

impl std::fmt::Debug for ReloadListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.inner.lock();
        let counts: HashMap<&str, usize> = table
            .by_plugin
            .iter()
            .map(|(id, listeners)| (id.as_str(), listeners.len()))
            .collect();
        f.debug_struct("ReloadListeners")
            .field("listeners", &counts)
            .finish()
    }
}
