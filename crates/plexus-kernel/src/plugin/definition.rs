//! Plugin definitions: the optional lifecycle hook slots of a plugin

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{PluginContext, PluginResult};

/// Future returned by a lifecycle hook
pub type HookFuture = BoxFuture<'static, PluginResult<()>>;

/// A typed lifecycle callback
///
/// Hooks receive an owned [`PluginContext`] (cheap to clone) so the returned
/// future does not borrow from the manager that invoked it.
pub type LifecycleHook = Arc<dyn Fn(PluginContext) -> HookFuture + Send + Sync>;

/// Lifecycle hook slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum HookKind {
    Install,
    Enable,
    Load,
    Disable,
    Uninstall,
}

impl HookKind {
    pub const ALL: [HookKind; 5] = [
        HookKind::Install,
        HookKind::Enable,
        HookKind::Load,
        HookKind::Disable,
        HookKind::Uninstall,
    ];

    /// Slot name as plugin authors see it
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Install => "on_install",
            HookKind::Enable => "on_enable",
            HookKind::Load => "on_load",
            HookKind::Disable => "on_disable",
            HookKind::Uninstall => "on_uninstall",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrap an async closure into a [`LifecycleHook`]
pub fn hook_fn<F, Fut>(hook: F) -> LifecycleHook
where
    F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PluginResult<()>> + Send + 'static,
{
    Arc::new(move |ctx: PluginContext| -> HookFuture { Box::pin(hook(ctx)) })
}

/// The behaviour half of a plugin: a set of optional lifecycle hooks
///
/// Every slot is optional; an absent hook makes the matching transition a
/// pure bookkeeping step.
///
/// ```rust,ignore
/// let definition = PluginDefinition::new()
///     .on_enable(|ctx| async move {
///         ctx.services().write().register(my_service(&ctx))?;
///         Ok(())
///     })
///     .on_disable(|ctx| async move {
///         ctx.services().write().unregister("my-service");
///         Ok(())
///     });
/// ```
#[derive(Clone, Default)]
pub struct PluginDefinition {
    on_install: Option<LifecycleHook>,
    on_enable: Option<LifecycleHook>,
    on_load: Option<LifecycleHook>,
    on_disable: Option<LifecycleHook>,
    on_uninstall: Option<LifecycleHook>,
}

impl PluginDefinition {
    /// Definition without any hooks
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_install<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.with_hook(HookKind::Install, hook_fn(hook))
    }

    pub fn on_enable<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.with_hook(HookKind::Enable, hook_fn(hook))
    }

    pub fn on_load<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.with_hook(HookKind::Load, hook_fn(hook))
    }

    pub fn on_disable<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.with_hook(HookKind::Disable, hook_fn(hook))
    }

    pub fn on_uninstall<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.with_hook(HookKind::Uninstall, hook_fn(hook))
    }

    /// Fill (or replace) one hook slot
    pub fn with_hook(mut self, kind: HookKind, hook: LifecycleHook) -> Self {
        *self.slot_mut(kind) = Some(hook);
        self
    }

    /// The hook in the given slot, if any
    pub fn hook(&self, kind: HookKind) -> Option<&LifecycleHook> {
        match kind {
            HookKind::Install => self.on_install.as_ref(),
            HookKind::Enable => self.on_enable.as_ref(),
            HookKind::Load => self.on_load.as_ref(),
            HookKind::Disable => self.on_disable.as_ref(),
            HookKind::Uninstall => self.on_uninstall.as_ref(),
        }
    }

    pub fn has_hook(&self, kind: HookKind) -> bool {
        self.hook(kind).is_some()
    }

    /// Slots that are filled, in lifecycle order
    pub fn hook_kinds(&self) -> Vec<HookKind> {
        HookKind::ALL
            .into_iter()
            .filter(|kind| self.has_hook(*kind))
            .collect()
    }

    fn slot_mut(&mut self, kind: HookKind) -> &mut Option<LifecycleHook> {
        match kind {
            HookKind::Install => &mut self.on_install,
            HookKind::Enable => &mut self.on_enable,
            HookKind::Load => &mut self.on_load,
            HookKind::Disable => &mut self.on_disable,
            HookKind::Uninstall => &mut self.on_uninstall,
        }
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("hooks", &self.hook_kinds())
            .finish()
    }
}
