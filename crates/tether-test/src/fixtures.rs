//! Fixtures for common plugin host types.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tether_plugins::{
    AllowAllValidator, BackendPlugin, DataSourceSettings, ManagerConfig, PluginClass,
    PluginContext, PluginDescriptor, PluginId, PluginManager, PluginSignature, PluginType,
    RequestValidator,
};

use crate::mocks::{MockInstaller, MockLoader};

/// Crash watch interval used by [`test_manager_config`].
pub const TEST_CRASH_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Repository URL used by [`test_manager_config`].
pub const TEST_REPO_URL: &str = "https://plugins.test/api/plugins";

/// A descriptor for a plugin at `dir`, version `1.0.0`, with a backend.
#[must_use]
pub fn test_descriptor(
    id: &str,
    plugin_type: PluginType,
    class: PluginClass,
    dir: &Path,
) -> PluginDescriptor {
    PluginDescriptor {
        id: PluginId::from_static(id),
        plugin_type,
        name: id.to_owned(),
        version: "1.0.0".to_owned(),
        class,
        dir: dir.to_path_buf(),
        backend: true,
        signature: PluginSignature::unsigned(),
    }
}

/// An external data source plugin installed as `<plugins_root>/<id>`.
#[must_use]
pub fn external_datasource(plugins_root: &Path, id: &str, version: &str) -> PluginDescriptor {
    let mut descriptor = test_descriptor(
        id,
        PluginType::Datasource,
        PluginClass::External,
        &plugins_root.join(id),
    );
    descriptor.version = version.to_owned();
    descriptor
}

/// Manager settings rooted at `root`: plugins in `root/plugins`, bundled
/// plugins in `root/plugins-bundled`, static files in `root/public`.
#[must_use]
pub fn test_manager_config(root: &Path) -> ManagerConfig {
    ManagerConfig {
        plugins_path: root.join("plugins"),
        bundled_plugins_path: root.join("plugins-bundled"),
        static_root: root.join("public"),
        repo_url: TEST_REPO_URL.to_owned(),
        crash_watch_interval: TEST_CRASH_WATCH_INTERVAL,
        build_version: "9.9.9".to_owned(),
    }
}

/// A manager over the given doubles that lets every request through.
#[must_use]
pub fn test_manager(
    root: &Path,
    loader: &Arc<MockLoader>,
    installer: &Arc<MockInstaller>,
) -> PluginManager {
    test_manager_with_validator(root, loader, installer, Arc::new(AllowAllValidator))
}

/// A manager over the given doubles and request validator.
#[must_use]
pub fn test_manager_with_validator(
    root: &Path,
    loader: &Arc<MockLoader>,
    installer: &Arc<MockInstaller>,
    validator: Arc<dyn RequestValidator>,
) -> PluginManager {
    PluginManager::new(
        test_manager_config(root),
        Arc::clone(loader) as Arc<dyn tether_plugins::Loader>,
        Arc::clone(installer) as Arc<dyn tether_plugins::Installer>,
        validator,
    )
}

/// Upcast a concrete backend for [`MockLoader::add`].
#[must_use]
pub fn backend<B: BackendPlugin + 'static>(backend: &Arc<B>) -> Option<Arc<dyn BackendPlugin>> {
    Some(Arc::clone(backend) as Arc<dyn BackendPlugin>)
}

/// A plugin context with no data source.
#[must_use]
pub fn test_context(id: &str) -> PluginContext {
    PluginContext::new(PluginId::from_static(id), 1)
}

/// A plugin context targeting a data source at `url` with JSON settings.
#[must_use]
pub fn test_context_with_data_source(id: &str, url: &str, json_data: &str) -> PluginContext {
    test_context(id).with_data_source(DataSourceSettings {
        id: 1,
        uid: "ds-uid".to_owned(),
        name: "Test data source".to_owned(),
        url: url.to_owned(),
        json_data: json_data.as_bytes().to_vec(),
    })
}
