use std::collections::HashSet;
use std::sync::Arc;

use plexus_kernel::plugin::{HookKind, PluginDefinition, PluginError, hook_fn};
use tokio::sync::RwLock;

/// One recorded hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCall {
    pub plugin_id: String,
    pub version: String,
    pub hook: HookKind,
}

impl HookCall {
    /// `plugin:hook`, e.g. `audit:on_enable`
    pub fn label(&self) -> String {
        format!("{}:{}", self.plugin_id, self.hook)
    }
}

/// A plugin definition whose hooks record every call
///
/// Hooks can be told to fail, in which case the call is still recorded.
/// Clones share the same history, so one recorder can back several plugins.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    /// Track all hook invocations in call order
    pub call_history: Arc<RwLock<Vec<HookCall>>>,
    failing: Arc<RwLock<HashSet<HookKind>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Definition with every hook slot filled
    pub fn definition(&self) -> PluginDefinition {
        HookKind::ALL
            .into_iter()
            .fold(PluginDefinition::new(), |definition, kind| {
                definition.with_hook(kind, self.hook(kind))
            })
    }

    /// Definition with only the given slots filled
    pub fn definition_with(&self, kinds: &[HookKind]) -> PluginDefinition {
        kinds.iter().fold(PluginDefinition::new(), |definition, kind| {
            definition.with_hook(*kind, self.hook(*kind))
        })
    }

    fn hook(&self, kind: HookKind) -> plexus_kernel::plugin::LifecycleHook {
        let history = self.call_history.clone();
        let failing = self.failing.clone();
        hook_fn(move |ctx| {
            let history = history.clone();
            let failing = failing.clone();
            async move {
                history.write().await.push(HookCall {
                    plugin_id: ctx.plugin_id.clone(),
                    version: ctx.manifest.version.clone(),
                    hook: kind,
                });
                if failing.read().await.contains(&kind) {
                    return Err(PluginError::other(format!(
                        "{} failed on purpose",
                        kind
                    )));
                }
                Ok(())
            }
        })
    }

    /// Make a hook slot fail from now on
    pub async fn fail_on(&self, kind: HookKind) {
        self.failing.write().await.insert(kind);
    }

    /// Let a previously failing hook slot succeed again
    pub async fn succeed_on(&self, kind: HookKind) {
        self.failing.write().await.remove(&kind);
    }

    /// Retrieve the history of hook calls
    pub async fn history(&self) -> Vec<HookCall> {
        self.call_history.read().await.clone()
    }

    /// History rendered as `plugin:hook` labels
    pub async fn labels(&self) -> Vec<String> {
        self.call_history
            .read()
            .await
            .iter()
            .map(HookCall::label)
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.call_history.read().await.len()
    }

    pub async fn clear(&self) {
        self.call_history.write().await.clear();
    }
}
