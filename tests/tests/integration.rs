use std::sync::Arc;

use plexus_kernel::error::KernelError;
use plexus_kernel::metrics::names;
use plexus_kernel::plugin::{HookKind, PluginDefinition, PluginError, PluginStatus};
use plexus_kernel::service::{ServiceImplementation, ServiceMetadata, ServiceQuery};
use plexus_plugins::hot_reload::{HotReloadManager, ReloadOptions, StateValue};
use plexus_plugins::HotReloadConfig;
use plexus_runtime::Kernel;
use plexus_testing::{RecordingHooks, RecordingMetrics, ScriptedInvalidator, manifest};
use serde_json::json;

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_enable_unregistered_plugin_is_not_found() {
    let mut kernel = Kernel::default();
    let report = kernel.enable("ghost").await.unwrap_err();
    match report.current_context() {
        KernelError::Plugin(err) => assert!(err.is_not_found()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_enable_runs_install_before_enable() {
    let hooks = RecordingHooks::new();
    let mut kernel = Kernel::default();
    kernel.register(manifest("audit", "1.0.0"), hooks.definition());

    kernel.enable("audit").await.unwrap();

    plexus_testing::assert_hooks_called!(hooks, ["audit:on_install", "audit:on_enable"]);
    assert_eq!(kernel.lifecycle().status("audit"), Some(PluginStatus::Enabled));
}

#[tokio::test]
async fn test_uninstall_runs_disable_then_uninstall() {
    let hooks = RecordingHooks::new();
    let mut kernel = Kernel::default();
    kernel.register(manifest("audit", "1.0.0"), hooks.definition());
    kernel.enable("audit").await.unwrap();
    hooks.clear().await;

    kernel.uninstall("audit").await.unwrap();

    plexus_testing::assert_hooks_called!(hooks, ["audit:on_disable", "audit:on_uninstall"]);
    assert!(kernel.lifecycle().get("audit").is_none());
}

#[tokio::test]
async fn test_failing_hook_leaves_flags_unchanged() {
    let hooks = RecordingHooks::new();
    hooks.fail_on(HookKind::Enable).await;
    let mut kernel = Kernel::default();
    kernel.register(manifest("audit", "1.0.0"), hooks.definition());

    let report = kernel.enable("audit").await.unwrap_err();
    assert!(matches!(
        report.current_context(),
        KernelError::Plugin(PluginError::HookFailed { hook: HookKind::Enable, .. })
    ));
    assert!(kernel.lifecycle().is_installed("audit"));
    assert!(!kernel.lifecycle().is_enabled("audit"));

    hooks.succeed_on(HookKind::Enable).await;
    kernel.enable("audit").await.unwrap();
    plexus_testing::assert_hooks_called!(
        hooks,
        ["audit:on_install", "audit:on_enable", "audit:on_enable"]
    );
}

#[tokio::test]
async fn test_hooks_share_one_recorder_across_plugins() {
    let hooks = RecordingHooks::new();
    let mut kernel = Kernel::default();
    kernel.register(
        manifest("api", "1.0.0").with_dependency("store", "^1"),
        hooks.definition_with(&[HookKind::Enable]),
    );
    kernel.register(
        manifest("store", "2.1.0"),
        hooks.definition_with(&[HookKind::Enable]),
    );

    kernel.enable_all().await.unwrap();

    let history = hooks.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].plugin_id, "store");
    assert_eq!(history[0].version, "2.1.0");
    assert_eq!(history[1].plugin_id, "api");
}

// ============================================================================
// Services registered by plugins
// ============================================================================

type ServiceSpec = (&'static str, &'static str, &'static [&'static str]);

const STORAGE_SERVICES: &[ServiceSpec] = &[
    ("kv.memory", "kv", &["fast", "volatile"]),
    ("kv.disk", "kv", &["durable"]),
    ("blob.s3", "blob", &["durable", "remote"]),
];

fn publishing(services: &'static [ServiceSpec]) -> PluginDefinition {
    PluginDefinition::new().on_enable(move |ctx| async move {
        let mut registry = ctx.services().write();
        for (id, service_type, tags) in services {
            registry.register(
                ServiceMetadata::new(
                    id,
                    id,
                    service_type,
                    &ctx.plugin_id,
                    ServiceImplementation::new(id.to_string()),
                )
                .with_tags(tags.iter().copied()),
            )?;
        }
        Ok(())
    })
}

#[tokio::test]
async fn test_query_over_plugin_services() {
    let mut kernel = Kernel::default();
    kernel.register(
        manifest("storage", "1.0.0"),
        publishing(STORAGE_SERVICES),
    );
    kernel.enable("storage").await.unwrap();

    let registry = kernel.services().read();
    let ids = |services: Vec<&ServiceMetadata>| {
        let mut ids: Vec<String> = services.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids
    };

    assert_eq!(
        ids(registry.query(&ServiceQuery::new().with_type("kv").with_tag("durable"))),
        vec!["kv.disk"]
    );
    assert_eq!(ids(registry.find_by_tag("durable")), vec!["blob.s3", "kv.disk"]);
    assert_eq!(registry.find_by_provider("storage").len(), 3);
    assert!(
        registry
            .query(&ServiceQuery::new().with_type("kv").with_tag("remote"))
            .is_empty()
    );
}

// ============================================================================
// Hot reload
// ============================================================================

#[tokio::test]
async fn test_reload_scenario_across_versions() {
    let invalidator = ScriptedInvalidator::new();
    let mut manager =
        HotReloadManager::new(HotReloadConfig::default()).with_invalidator(Arc::new(invalidator.clone()));
    manager.register(
        "P",
        manifest("P", "1.0.0"),
        PluginDefinition::new(),
        Some(StateValue::from(json!({ "count": 1 }))),
    );

    let result = manager
        .reload("P", manifest("P", "1.1.0"), PluginDefinition::new(), ReloadOptions::default())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(
        manager.get_state("P").and_then(StateValue::to_json),
        Some(json!({ "count": 1 }))
    );

    let result = manager
        .reload("P", manifest("P", "2.0.0"), PluginDefinition::new(), ReloadOptions::default())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.old_version, "1.1.0");
    assert_eq!(result.new_version, "2.0.0");

    let before = manager.entry("P").cloned().unwrap();
    invalidator.set_failing(true);
    let result = manager
        .reload("P", manifest("P", "2.1.0"), PluginDefinition::new(), ReloadOptions::default())
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("could not be invalidated"));

    let after = manager.entry("P").unwrap();
    assert_eq!(after.manifest, before.manifest);
    assert_eq!(after.version(), "2.0.0");
    assert_eq!(after.state, before.state);
    assert_eq!(after.loaded_at, before.loaded_at);
    assert_eq!(after.reload_count, 2);

    assert_eq!(invalidator.call_count(), 3);
    assert_eq!(
        *invalidator.requests.lock(),
        vec![
            ("P".to_string(), "1.1.0".to_string()),
            ("P".to_string(), "2.0.0".to_string()),
            ("P".to_string(), "2.1.0".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_preserved_state_is_a_fresh_copy() {
    let mut manager = HotReloadManager::default();
    manager.register(
        "P",
        manifest("P", "1.0.0"),
        PluginDefinition::new(),
        Some(StateValue::from(json!({ "label": "primary", "peers": ["a", "b"] }))),
    );

    let before = manager.get_state("P").cloned().unwrap();
    let label_ptr = manager
        .get_state("P")
        .and_then(|s| s.get("label"))
        .and_then(StateValue::as_str)
        .unwrap()
        .as_ptr();
    let peers_ptr = manager
        .get_state("P")
        .and_then(|s| s.get("peers"))
        .and_then(StateValue::as_list)
        .unwrap()
        .as_ptr();

    manager
        .reload("P", manifest("P", "1.0.1"), PluginDefinition::new(), ReloadOptions::default())
        .await
        .unwrap();

    let after = manager.get_state("P").unwrap();
    assert_eq!(after, &before);
    let new_label = after.get("label").and_then(StateValue::as_str).unwrap();
    let new_peers = after.get("peers").and_then(StateValue::as_list).unwrap();
    assert_ne!(new_label.as_ptr(), label_ptr);
    assert_ne!(new_peers.as_ptr(), peers_ptr);
}

#[tokio::test]
async fn test_reload_without_preservation_clears_state() {
    let mut manager = HotReloadManager::default();
    manager.register(
        "P",
        manifest("P", "1.0.0"),
        PluginDefinition::new(),
        Some(StateValue::from(json!({ "count": 1 }))),
    );

    let result = manager
        .reload(
            "P",
            manifest("P", "1.1.0"),
            PluginDefinition::new(),
            ReloadOptions::new().with_preserve_state(false),
        )
        .await
        .unwrap();
    assert!(result.success);
    assert!(manager.get_state("P").is_none());
}

#[tokio::test]
async fn test_listener_failures_do_not_reach_caller() {
    let mut manager = HotReloadManager::default();
    manager.register("P", manifest("P", "1.0.0"), PluginDefinition::new(), None);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    manager.on_reload("P", |_| Err(PluginError::other("listener broke")));
    let sink = seen.clone();
    manager.on_reload("P", move |result| {
        sink.lock().push(result.new_version.clone());
        Ok(())
    });

    let result = manager
        .reload("P", manifest("P", "1.0.1"), PluginDefinition::new(), ReloadOptions::default())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(*seen.lock(), vec!["1.0.1".to_string()]);
}

#[tokio::test]
async fn test_kernel_reports_reload_metrics() {
    let metrics = Arc::new(RecordingMetrics::new());
    let invalidator = ScriptedInvalidator::new();
    let hooks = RecordingHooks::new();
    let mut kernel = Kernel::builder()
        .with_metrics(metrics.clone())
        .with_invalidator(Arc::new(invalidator.clone()))
        .build();

    kernel.register(manifest("audit", "1.0.0"), hooks.definition());
    kernel.enable("audit").await.unwrap();
    assert_eq!(metrics.duration_count(names::HOOK_DURATION, "audit"), 2);

    kernel.track("audit", None).unwrap();
    kernel
        .reload("audit", manifest("audit", "1.1.0"), hooks.definition())
        .await
        .unwrap();
    invalidator.set_failing(true);
    let result = kernel
        .reload("audit", manifest("audit", "1.2.0"), hooks.definition())
        .await
        .unwrap();
    assert!(!result.success);

    assert_eq!(metrics.duration_count(names::RELOAD_DURATION, "audit"), 2);
    assert_eq!(metrics.counter(names::RELOAD_FAILED, "audit"), 1);
    assert_eq!(
        kernel.lifecycle().get("audit").unwrap().manifest.version,
        "1.1.0"
    );
}
