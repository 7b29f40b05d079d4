//! The plugin manager: owns the registry and supervisor and routes every
//! host request to the right plugin.
//!
//! The implementation is split across submodules by concern:
//! - `dispatch`: data queries, health checks and metrics
//! - `resource`: resource calls and their HTTP error mapping
//! - `install`: install, upgrade and uninstall

mod dispatch;
mod install;
mod resource;

pub use resource::call_resource_error_status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::BackendFactory;
use crate::error::{PluginError, PluginResult};
use crate::handle::PluginHandle;
use crate::installer::Installer;
use crate::instrumentation::{Instrumentation, TracingInstrumentation};
use crate::loader::Loader;
use crate::models::StaticRoute;
use crate::plugin::{PluginId, PluginType};
use crate::registry::PluginRegistry;
use crate::security::RequestValidator;
use crate::supervisor::Supervisor;

/// Settings the manager needs from the host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Root of externally installed plugins.
    pub plugins_path: PathBuf,
    /// Directory of plugins shipped with the host.
    pub bundled_plugins_path: PathBuf,
    /// Host static root; core plugins live below `app/plugins`.
    pub static_root: PathBuf,
    /// Repository used when an install does not name one.
    pub repo_url: String,
    /// Crash watcher poll interval.
    pub crash_watch_interval: Duration,
    /// Host version reported to the installer.
    pub build_version: String,
}

impl ManagerConfig {
    /// Core plugin directories, data sources first.
    #[must_use]
    pub fn core_plugin_dirs(&self) -> Vec<PathBuf> {
        let plugins = self.static_root.join("app").join("plugins");
        vec![plugins.join("datasource"), plugins.join("panel")]
    }

    fn factory_plugin_dir(&self, id: &PluginId) -> PathBuf {
        self.static_root
            .join("app")
            .join("plugins")
            .join("datasource")
            .join(id.as_str())
    }
}

/// Registry, lifecycle and request routing for backend plugins.
///
/// Intended to be shared behind an `Arc`; every method takes `&self`.
pub struct PluginManager {
    config: ManagerConfig,
    registry: PluginRegistry,
    supervisor: Supervisor,
    loader: Arc<dyn Loader>,
    installer: Arc<dyn Installer>,
    validator: Arc<dyn RequestValidator>,
    instrumentation: Arc<dyn Instrumentation>,
    /// Serializes install and uninstall per plugin id.
    install_locks: DashMap<PluginId, Arc<tokio::sync::Mutex<()>>>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    /// Create a manager. No plugins are loaded until [`init`](Self::init).
    #[must_use]
    pub fn new(
        config: ManagerConfig,
        loader: Arc<dyn Loader>,
        installer: Arc<dyn Installer>,
        validator: Arc<dyn RequestValidator>,
    ) -> Self {
        let supervisor = Supervisor::new(config.crash_watch_interval);
        Self {
            config,
            registry: PluginRegistry::new(),
            supervisor,
            loader,
            installer,
            validator,
            instrumentation: Arc::new(TracingInstrumentation),
            install_locks: DashMap::new(),
        }
    }

    /// Replace the default [`TracingInstrumentation`].
    #[must_use]
    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Number of running crash watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.supervisor.watcher_count()
    }

    /// Load core, then bundled, then external plugins.
    ///
    /// # Errors
    ///
    /// Stops at the first discovery or registration failure.
    pub async fn init(&self) -> PluginResult<()> {
        self.load_plugins(&self.config.core_plugin_dirs()).await?;
        self.load_plugins(std::slice::from_ref(&self.config.bundled_plugins_path))
            .await?;
        self.load_plugins(std::slice::from_ref(&self.config.plugins_path))
            .await?;
        info!(plugins = self.registry.len(), "plugins loaded");
        Ok(())
    }

    /// Discover plugins under `paths`, skipping known ids, then register and
    /// start each one.
    async fn load_plugins(&self, paths: &[PathBuf]) -> PluginResult<()> {
        let known = self.registry.ids();
        let discovered = self.loader.discover(paths, &known).await?;
        for handle in discovered {
            self.register_and_start(Arc::new(handle)).await?;
        }
        Ok(())
    }

    async fn register_and_start(&self, handle: Arc<PluginHandle>) -> PluginResult<()> {
        self.registry.register(Arc::clone(&handle))?;
        self.supervisor.start(&handle).await;
        Ok(())
    }

    /// Block until `token` is cancelled, then shut down.
    ///
    /// # Errors
    ///
    /// Always returns [`PluginError::Cancelled`] once shutdown has finished.
    pub async fn run(&self, token: CancellationToken) -> PluginResult<()> {
        token.cancelled().await;
        self.shutdown().await;
        Err(PluginError::Cancelled)
    }

    /// Stop crash watchers, then stop every plugin.
    pub async fn shutdown(&self) {
        debug!("shutting down plugin manager");
        self.supervisor.shutdown().await;
        self.stop_all().await;
    }

    /// Stop every registered plugin concurrently. Failures are logged.
    pub async fn stop_all(&self) {
        Supervisor::stop_all(self.registry.all()).await;
    }

    /// Register a plugin whose backend is created by `factory`. The plugin
    /// is not started; its lifecycle belongs to the factory.
    ///
    /// # Errors
    ///
    /// [`PluginError::AlreadyRegistered`] if a live plugin has this id, or
    /// the loader's error.
    pub async fn register_with_factory(
        &self,
        id: PluginId,
        factory: BackendFactory,
    ) -> PluginResult<()> {
        if self.registry.is_registered(&id) {
            return Err(PluginError::AlreadyRegistered(id));
        }
        let path = self.config.factory_plugin_dir(&id);
        let handle = self.loader.load_with_factory(&path, factory).await?;
        self.registry.register(Arc::new(handle))
    }

    /// Live plugin with `id`.
    #[must_use]
    pub fn lookup(&self, id: &PluginId) -> Option<Arc<PluginHandle>> {
        self.registry.lookup(id)
    }

    /// Live plugin with `id` and the given type.
    #[must_use]
    pub fn lookup_by_type(&self, id: &PluginId, plugin_type: PluginType) -> Option<Arc<PluginHandle>> {
        self.registry.lookup_by_type(id, plugin_type)
    }

    /// Live plugins of the given types; all types when `types` is empty.
    #[must_use]
    pub fn list(&self, types: &[PluginType]) -> Vec<Arc<PluginHandle>> {
        self.registry.list(types)
    }

    /// The image renderer, if one is loaded.
    #[must_use]
    pub fn renderer(&self) -> Option<Arc<PluginHandle>> {
        self.registry.renderer()
    }

    /// Static asset directory of every live plugin.
    #[must_use]
    pub fn static_routes(&self) -> Vec<StaticRoute> {
        self.registry
            .list(&[])
            .into_iter()
            .map(|h| StaticRoute {
                plugin_id: h.id().clone(),
                directory: h.dir().to_path_buf(),
            })
            .collect()
    }
}
