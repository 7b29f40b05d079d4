//! Registry and supervision behavior observed through the manager.

use std::sync::Arc;
use std::time::Duration;

use tether_plugins::{PluginClass, PluginError, PluginId, PluginType};
use tether_test::{
    MockBackend, MockInstaller, MockLoader, TEST_CRASH_WATCH_INTERVAL, TestRoot, backend,
    external_datasource, setup_test_logging, test_descriptor, test_manager,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Let spawned watchers take their first poll at the current instant.
async fn settle() {
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
}

async fn tick() {
    tokio::time::advance(TEST_CRASH_WATCH_INTERVAL).await;
    settle().await;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registry_keeps_first_handle_on_duplicate_register() {
    let root = TestRoot::new();
    let loader = Arc::new(MockLoader::new());
    loader.add(root.plugins(), external_datasource(&root.plugins(), "mysql", "1.0.0"), None);
    let manager = test_manager(root.path(), &loader, &Arc::new(MockInstaller::new()));
    manager.init().await.unwrap();

    let first = manager.lookup(&PluginId::from_static("mysql")).unwrap();
    let dup = Arc::new(tether_plugins::PluginHandle::new(
        external_datasource(&root.plugins(), "mysql", "2.0.0"),
        None,
    ));
    let err = manager.registry().register(dup).unwrap_err();

    assert!(matches!(err, PluginError::AlreadyRegistered(_)));
    let found = manager.lookup(&PluginId::from_static("mysql")).unwrap();
    assert!(Arc::ptr_eq(&first, &found));
    assert_eq!(found.version(), "1.0.0");
}

#[tokio::test]
async fn lookups_respect_type_and_decommission() {
    let root = TestRoot::new();
    let loader = Arc::new(MockLoader::new());
    loader.add(root.plugins(), external_datasource(&root.plugins(), "loki", "1.0.0"), None);
    loader.add(
        root.plugins(),
        test_descriptor(
            "clock-panel",
            PluginType::Panel,
            PluginClass::External,
            &root.plugins().join("clock-panel"),
        ),
        None,
    );
    let manager = test_manager(root.path(), &loader, &Arc::new(MockInstaller::new()));
    manager.init().await.unwrap();

    let loki = PluginId::from_static("loki");
    assert!(manager.lookup_by_type(&loki, PluginType::Datasource).is_some());
    assert!(manager.lookup_by_type(&loki, PluginType::Panel).is_none());
    assert_eq!(manager.list(&[PluginType::Panel]).len(), 1);
    assert_eq!(manager.list(&[]).len(), 2);

    manager.lookup(&loki).unwrap().decommission();
    assert!(manager.lookup(&loki).is_none());
    assert!(manager.lookup_by_type(&loki, PluginType::Datasource).is_none());
    assert_eq!(manager.list(&[]).len(), 1);
    assert_eq!(manager.registry().len(), 2);
}

// ---------------------------------------------------------------------------
// Supervision
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn crashed_plugin_is_restarted_until_decommissioned() {
    setup_test_logging("tether_plugins=debug");
    let root = TestRoot::new();
    let mock = Arc::new(MockBackend::new());
    let loader = Arc::new(MockLoader::new());
    loader.add(
        root.plugins(),
        external_datasource(&root.plugins(), "postgres", "1.0.0"),
        backend(&mock),
    );
    let manager = test_manager(root.path(), &loader, &Arc::new(MockInstaller::new()));
    manager.init().await.unwrap();
    settle().await;
    assert_eq!(mock.start_count(), 1);
    assert_eq!(manager.watcher_count(), 1);

    // A single exit observation gives a single restart.
    mock.set_exited(true);
    tick().await;
    assert_eq!(mock.start_count(), 2);
    tick().await;
    tick().await;
    assert_eq!(mock.start_count(), 2);

    // Restart failures keep being retried.
    mock.fail_next_starts(2);
    mock.set_exited(true);
    tick().await;
    tick().await;
    tick().await;
    assert_eq!(mock.start_count(), 5);
    tick().await;
    assert_eq!(mock.start_count(), 5);

    // Never restarted once decommissioned.
    manager
        .lookup(&PluginId::from_static("postgres"))
        .unwrap()
        .decommission();
    mock.set_exited(true);
    tick().await;
    tick().await;
    assert_eq!(mock.start_count(), 5);
    assert_eq!(manager.watcher_count(), 0);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn frontend_and_factory_plugins_are_not_supervised() {
    let root = TestRoot::new();
    let unmanaged = Arc::new(MockBackend::unmanaged());
    let loader = Arc::new(MockLoader::new());
    loader.add(
        root.plugins(),
        external_datasource(&root.plugins(), "factory-ds", "1.0.0"),
        backend(&unmanaged),
    );
    let mut panel = test_descriptor(
        "clock-panel",
        PluginType::Panel,
        PluginClass::External,
        &root.plugins().join("clock-panel"),
    );
    panel.backend = false;
    let frontend = Arc::new(MockBackend::new());
    loader.add(root.plugins(), panel, backend(&frontend));

    let manager = test_manager(root.path(), &loader, &Arc::new(MockInstaller::new()));
    manager.init().await.unwrap();
    settle().await;

    assert_eq!(unmanaged.start_count(), 0);
    assert_eq!(frontend.start_count(), 0);
    assert_eq!(manager.watcher_count(), 0);
}

#[tokio::test]
async fn stop_all_tolerates_failures_and_repeats() {
    let root = TestRoot::new();
    let healthy = Arc::new(MockBackend::new());
    let broken = Arc::new(MockBackend::new().with_stop_error("process already gone"));
    let loader = Arc::new(MockLoader::new());
    loader.add(
        root.plugins(),
        external_datasource(&root.plugins(), "healthy", "1.0.0"),
        backend(&healthy),
    );
    loader.add(
        root.plugins(),
        external_datasource(&root.plugins(), "broken", "1.0.0"),
        backend(&broken),
    );
    let manager = test_manager(root.path(), &loader, &Arc::new(MockInstaller::new()));
    manager.init().await.unwrap();

    manager.stop_all().await;
    manager.stop_all().await;

    assert_eq!(healthy.stop_count(), 2);
    assert_eq!(broken.stop_count(), 2);
    manager.shutdown().await;
}

#[tokio::test]
async fn run_stops_everything_and_reports_cancellation() {
    let root = TestRoot::new();
    let mock = Arc::new(MockBackend::new());
    let loader = Arc::new(MockLoader::new());
    loader.add(
        root.plugins(),
        external_datasource(&root.plugins(), "influx", "1.0.0"),
        backend(&mock),
    );
    let manager = Arc::new(test_manager(
        root.path(),
        &loader,
        &Arc::new(MockInstaller::new()),
    ));
    manager.init().await.unwrap();

    let token = tether_plugins::CancellationToken::new();
    let run = tokio::spawn({
        let manager = Arc::clone(&manager);
        let token = token.clone();
        async move { manager.run(token).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!run.is_finished());

    token.cancel();
    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, PluginError::Cancelled));
    assert_eq!(mock.stop_count(), 1);
    assert_eq!(manager.watcher_count(), 0);
}
