//! Install, upgrade, uninstall and factory registration through the manager.

use std::path::PathBuf;
use std::sync::Arc;

use tether_plugins::{
    BackendFactory, BackendPlugin, CancellationToken, ErrorKind, InstallOptions, PluginClass,
    PluginId, PluginManager, PluginType,
};
use tether_test::{
    InstallerCall, MockBackend, MockInstaller, MockLoader, TEST_REPO_URL, TestRoot, backend,
    external_datasource, test_descriptor, test_manager,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Fixture {
    root: TestRoot,
    loader: Arc<MockLoader>,
    installer: Arc<MockInstaller>,
    manager: PluginManager,
}

async fn fixture(installer: MockInstaller) -> Fixture {
    let root = TestRoot::new();
    let loader = Arc::new(MockLoader::new());
    let installer = Arc::new(installer);
    let manager = test_manager(root.path(), &loader, &installer);
    manager.init().await.unwrap();
    Fixture {
        root,
        loader,
        installer,
        manager,
    }
}

fn mysql() -> PluginId {
    PluginId::from_static("mysql")
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_install_loads_the_new_plugin() {
    let f = fixture(MockInstaller::new()).await;
    let mock = Arc::new(MockBackend::new());
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "1.0.0"),
        backend(&mock),
    );

    f.manager
        .install(&CancellationToken::new(), &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap();

    let calls = f.installer.calls();
    assert_eq!(calls.len(), 1);
    let InstallerCall::Install(request) = &calls[0] else {
        panic!("expected an install call, got {calls:?}");
    };
    assert_eq!(request.plugin_id, mysql());
    assert_eq!(request.version, "1.0.0");
    assert_eq!(request.install_dir, f.root.plugins());
    assert_eq!(request.archive_url, None);
    assert_eq!(request.repo_url, TEST_REPO_URL);
    assert_eq!(request.host_version, "9.9.9");

    assert_eq!(f.manager.lookup(&mysql()).unwrap().version(), "1.0.0");
    assert_eq!(mock.start_count(), 1);
    f.manager.shutdown().await;
}

#[tokio::test]
async fn upgrade_replaces_the_installed_version() {
    let f = fixture(MockInstaller::new().with_archive_url("https://cdn.test/mysql-2.0.0.zip"))
        .await;
    let v1 = Arc::new(MockBackend::new());
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "1.0.0"),
        backend(&v1),
    );
    let token = CancellationToken::new();
    f.manager
        .install(&token, &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap();

    // What the installer will have put on disk.
    let v2 = Arc::new(MockBackend::new());
    f.loader.clear(&f.root.plugins());
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "2.0.0"),
        backend(&v2),
    );

    f.manager
        .install(
            &token,
            &mysql(),
            "2.0.0",
            InstallOptions {
                repo_url: Some("https://mirror.test/api/plugins".to_owned()),
                ..InstallOptions::default()
            },
        )
        .await
        .unwrap();

    let calls = f.installer.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls[1],
        InstallerCall::GetUpdateInfo {
            plugin_id: mysql(),
            version: "2.0.0".to_owned(),
            repo_url: "https://mirror.test/api/plugins".to_owned(),
        }
    );
    assert_eq!(calls[2], InstallerCall::Uninstall(f.root.plugins().join("mysql")));
    let InstallerCall::Install(request) = &calls[3] else {
        panic!("expected an install call, got {:?}", calls[3]);
    };
    assert_eq!(request.version, "2.0.0");
    assert_eq!(
        request.archive_url.as_deref(),
        Some("https://cdn.test/mysql-2.0.0.zip")
    );
    assert_eq!(request.repo_url, "https://mirror.test/api/plugins");

    assert_eq!(v1.stop_count(), 1);
    assert_eq!(v2.start_count(), 1);
    assert_eq!(f.manager.lookup(&mysql()).unwrap().version(), "2.0.0");
    f.manager.shutdown().await;
}

#[tokio::test]
async fn explicit_archive_url_and_dir_are_honored() {
    let f = fixture(MockInstaller::new()).await;
    let custom = f.root.path().join("custom-plugins");
    f.loader.add(custom.clone(), external_datasource(&custom, "mysql", "1.0.0"), None);

    f.manager
        .install(
            &CancellationToken::new(),
            &mysql(),
            "1.0.0",
            InstallOptions {
                install_dir: Some(custom.clone()),
                archive_url: Some("file:///tmp/mysql.zip".to_owned()),
                repo_url: None,
            },
        )
        .await
        .unwrap();

    let calls = f.installer.calls();
    let InstallerCall::Install(request) = &calls[0] else {
        panic!("expected an install call, got {calls:?}");
    };
    assert_eq!(request.install_dir, custom);
    assert_eq!(request.archive_url.as_deref(), Some("file:///tmp/mysql.zip"));
    assert_eq!(f.loader.discover_calls().last(), Some(&vec![custom.clone()]));
    assert_eq!(f.manager.lookup(&mysql()).unwrap().dir(), custom.join("mysql"));
}

#[tokio::test]
async fn install_that_places_no_plugin_is_an_error() {
    let f = fixture(MockInstaller::new()).await;

    let err = f
        .manager
        .install(&CancellationToken::new(), &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("mysql"));
    assert_eq!(f.installer.calls().len(), 1);
    assert!(f.manager.lookup(&mysql()).is_none());
}

#[tokio::test]
async fn installing_the_same_version_is_rejected() {
    let f = fixture(MockInstaller::new()).await;
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "1.0.0"),
        None,
    );
    let token = CancellationToken::new();
    f.manager
        .install(&token, &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap();

    let err = f
        .manager
        .install(&token, &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateInstall);
    assert!(err.to_string().contains("mysql"));
    assert_eq!(f.installer.calls().len(), 1);
}

#[tokio::test]
async fn installer_failure_is_reported() {
    let f = fixture(MockInstaller::new().with_install_error("checksum mismatch")).await;

    let err = f
        .manager
        .install(&CancellationToken::new(), &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("checksum mismatch"));
    assert!(f.manager.lookup(&mysql()).is_none());
}

// ---------------------------------------------------------------------------
// Core and bundled plugins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bundled_plugins_are_protected() {
    let root = TestRoot::new();
    let loader = Arc::new(MockLoader::new());
    let bundled = root.path().join("plugins-bundled");
    loader.add(
        bundled.clone(),
        test_descriptor(
            "piechart",
            PluginType::Panel,
            PluginClass::Bundled,
            &bundled.join("piechart"),
        ),
        None,
    );
    let installer = Arc::new(MockInstaller::new());
    let manager = test_manager(root.path(), &loader, &installer);
    manager.init().await.unwrap();
    let id = PluginId::from_static("piechart");
    let token = CancellationToken::new();

    let err = manager
        .install(&token, &id, "2.0.0", InstallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotInstallCore);

    let err = manager.uninstall(&token, &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotUninstallCore);

    assert!(installer.calls().is_empty());
    assert!(manager.lookup(&id).is_some());
}

#[tokio::test]
async fn init_loads_core_then_bundled_then_external() {
    let f = fixture(MockInstaller::new()).await;
    let public = f.root.path().join("public").join("app").join("plugins");

    assert_eq!(
        f.loader.discover_calls(),
        [
            vec![public.join("datasource"), public.join("panel")],
            vec![f.root.path().join("plugins-bundled")],
            vec![f.root.plugins()],
        ]
    );
}

// ---------------------------------------------------------------------------
// Uninstall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn uninstall_outside_plugin_dir_is_refused() {
    let f = fixture(MockInstaller::new()).await;
    let escaped = f.root.plugins().join("..").join("etc");
    let mut descriptor = external_datasource(&f.root.plugins(), "mysql", "1.0.0");
    descriptor.dir = escaped;
    let mock = Arc::new(MockBackend::new());
    f.loader.add(f.root.plugins(), descriptor, backend(&mock));
    let token = CancellationToken::new();
    f.manager
        .install(&token, &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap();

    let err = f.manager.uninstall(&token, &mysql()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OutsideOfPluginDir);
    assert!(f.manager.lookup(&mysql()).is_some());
    assert_eq!(mock.stop_count(), 0);
    assert!(
        !f.installer
            .calls()
            .iter()
            .any(|c| matches!(c, InstallerCall::Uninstall(_)))
    );
    f.manager.shutdown().await;
}

#[tokio::test]
async fn failed_stop_does_not_strand_the_plugin_id() {
    let f = fixture(MockInstaller::new()).await;
    let stuck = Arc::new(MockBackend::new().with_stop_error("stop timed out"));
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "1.0.0"),
        backend(&stuck),
    );
    let token = CancellationToken::new();
    f.manager
        .install(&token, &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap();

    let err = f.manager.uninstall(&token, &mysql()).await.unwrap_err();
    assert!(err.to_string().contains("stop timed out"));
    assert!(f.manager.registry().get(&mysql()).is_none());

    // A fresh copy on disk installs and loads normally.
    let fresh = Arc::new(MockBackend::new());
    f.loader.clear(&f.root.plugins());
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "1.0.0"),
        backend(&fresh),
    );
    f.manager
        .install(&token, &mysql(), "1.0.0", InstallOptions::default())
        .await
        .unwrap();

    assert_eq!(fresh.start_count(), 1);
    assert!(f.manager.lookup(&mysql()).is_some());
    f.manager.uninstall(&token, &mysql()).await.unwrap();
    assert!(f.manager.lookup(&mysql()).is_none());
}

#[tokio::test]
async fn uninstall_unknown_plugin() {
    let f = fixture(MockInstaller::new()).await;
    let err = f
        .manager
        .uninstall(&CancellationToken::new(), &mysql())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInstalled);
}

#[tokio::test]
async fn concurrent_installs_of_one_plugin_are_serialized() {
    let f = fixture(MockInstaller::new()).await;
    f.loader.add(
        f.root.plugins(),
        external_datasource(&f.root.plugins(), "mysql", "1.0.0"),
        None,
    );
    let token = CancellationToken::new();
    let id = mysql();

    let (a, b) = tokio::join!(
        f.manager.install(&token, &id, "1.0.0", InstallOptions::default()),
        f.manager.install(&token, &id, "1.0.0", InstallOptions::default()),
    );

    let failures: Vec<_> = [a, b].into_iter().filter_map(Result::err).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind(), ErrorKind::DuplicateInstall);
    assert_eq!(f.manager.registry().len(), 1);
}

// ---------------------------------------------------------------------------
// Factory plugins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn factory_plugin_is_registered_but_not_started() {
    let f = fixture(MockInstaller::new()).await;
    let mock = Arc::new(MockBackend::unmanaged());
    let factory: BackendFactory = {
        let mock = Arc::clone(&mock);
        Arc::new(move |_id: &PluginId| Ok(Arc::clone(&mock) as Arc<dyn BackendPlugin>))
    };
    let id = PluginId::from_static("testdata");

    f.manager
        .register_with_factory(id.clone(), Arc::clone(&factory))
        .await
        .unwrap();

    let expected: PathBuf = f
        .root
        .path()
        .join("public/app/plugins/datasource/testdata");
    assert_eq!(f.loader.factory_paths(), [expected]);
    assert!(f.manager.lookup(&id).is_some());
    assert_eq!(mock.start_count(), 0);
    assert_eq!(f.manager.watcher_count(), 0);

    let err = f
        .manager
        .register_with_factory(id, factory)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);
}
