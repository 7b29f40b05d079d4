//! Install, upgrade and uninstall.
//!
//! Calls for the same plugin id are serialized on a per-id lock; an upgrade
//! runs its uninstall step under the lock it already holds.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::PluginManager;
use crate::error::{PluginError, PluginResult};
use crate::installer::{InstallOptions, InstallRequest};
use crate::plugin::PluginId;

impl PluginManager {
    /// Install `version` of `plugin_id`, upgrading an existing external
    /// installation, then load and start whatever the install placed on disk.
    ///
    /// # Errors
    ///
    /// - [`PluginError::CannotInstallCore`] if the id belongs to a core or
    ///   bundled plugin
    /// - [`PluginError::DuplicateInstall`] if that exact version is installed
    /// - any error from the update lookup, the uninstall step, the installer
    ///   or discovery
    /// - [`PluginError::Other`] if discovery finds no plugin with this id in
    ///   the install directory
    pub async fn install(
        &self,
        token: &CancellationToken,
        plugin_id: &PluginId,
        version: &str,
        opts: InstallOptions,
    ) -> PluginResult<()> {
        let lock = self.install_lock(plugin_id);
        let _guard = lock.lock().await;

        let repo_url = opts
            .repo_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.config.repo_url.clone());

        let mut resolved_archive = None;
        if let Some(existing) = self.registry.lookup(plugin_id) {
            if !existing.is_external() {
                return Err(PluginError::CannotInstallCore);
            }
            if existing.version() == version {
                return Err(PluginError::DuplicateInstall {
                    plugin_id: plugin_id.clone(),
                    existing_dir: existing.dir().to_path_buf(),
                });
            }

            let update = self
                .installer
                .get_update_info(plugin_id, version, &repo_url)
                .await?;
            resolved_archive = Some(update.archive_url);

            info!(
                plugin_id = %plugin_id,
                from = existing.version(),
                to = version,
                "upgrading plugin"
            );
            self.uninstall_locked(token, plugin_id).await?;
        }

        let install_dir = opts
            .install_dir
            .unwrap_or_else(|| self.config.plugins_path.clone());
        let archive_url = opts
            .archive_url
            .filter(|url| !url.is_empty())
            .or(resolved_archive);

        self.installer
            .install(
                token,
                InstallRequest {
                    plugin_id: plugin_id.clone(),
                    version: version.to_owned(),
                    install_dir: install_dir.clone(),
                    archive_url,
                    repo_url,
                    host_version: self.config.build_version.clone(),
                },
            )
            .await?;
        info!(plugin_id = %plugin_id, version, "plugin installed");

        self.load_plugins(std::slice::from_ref(&install_dir)).await?;
        if !self.registry.is_registered(plugin_id) {
            return Err(PluginError::Other(format!(
                "plugin {plugin_id} was not found in {} after install",
                install_dir.display()
            )));
        }
        Ok(())
    }

    /// Stop, unregister and remove an external plugin.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotInstalled`] if no live plugin has this id
    /// - [`PluginError::CannotUninstallCore`] if it is core or bundled
    /// - [`PluginError::OutsideOfPluginDir`] if its directory is not strictly
    ///   inside the external-plugins root; nothing is stopped or removed
    /// - the stop or installer failure
    pub async fn uninstall(&self, token: &CancellationToken, plugin_id: &PluginId) -> PluginResult<()> {
        let lock = self.install_lock(plugin_id);
        let _guard = lock.lock().await;
        self.uninstall_locked(token, plugin_id).await
    }

    async fn uninstall_locked(&self, token: &CancellationToken, plugin_id: &PluginId) -> PluginResult<()> {
        let handle = self
            .registry
            .lookup(plugin_id)
            .ok_or(PluginError::NotInstalled)?;

        if !handle.is_external() {
            return Err(PluginError::CannotUninstallCore);
        }

        if !is_strictly_inside(&self.config.plugins_path, handle.dir()) {
            return Err(PluginError::OutsideOfPluginDir);
        }

        self.registry.unregister_and_stop(&handle).await?;
        self.installer.uninstall(token, handle.dir()).await?;
        info!(plugin_id = %plugin_id, "plugin uninstalled");
        Ok(())
    }

    fn install_lock(&self, plugin_id: &PluginId) -> Arc<tokio::sync::Mutex<()>> {
        self.install_locks
            .entry(plugin_id.clone())
            .or_default()
            .clone()
    }
}

/// Whether `dir` names a path strictly below `root`, compared lexically
/// after resolving `.` and `..` components.
fn is_strictly_inside(root: &Path, dir: &Path) -> bool {
    if root.is_absolute() != dir.is_absolute() {
        return false;
    }
    let root = normalize(root);
    let dir = normalize(dir);
    dir != root && dir.starts_with(&root)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(component.as_os_str());
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::backend::BackendPlugin;
    use crate::error::ErrorKind;
    use crate::handle::test_support::{StubBackend, descriptor};
    use crate::manager::test_support::{FixedLoader, NullInstaller, manager};
    use crate::plugin::{PluginClass, PluginType};

    #[test]
    fn strict_descendant_check() {
        let root = Path::new("/var/lib/tether/plugins");
        assert!(is_strictly_inside(root, Path::new("/var/lib/tether/plugins/clock-panel")));
        assert!(is_strictly_inside(root, Path::new("/var/lib/tether/plugins/./a/../b")));
        assert!(!is_strictly_inside(root, Path::new("/var/lib/tether/plugins")));
        assert!(!is_strictly_inside(root, Path::new("/var/lib/tether/plugins/..")));
        assert!(!is_strictly_inside(root, Path::new("/var/lib/tether/plugins/../../etc")));
        assert!(!is_strictly_inside(root, Path::new("/var/lib/tether/plugins-evil/x")));
        assert!(!is_strictly_inside(root, Path::new("clock-panel")));
    }

    async fn setup(dir: &str, class: PluginClass) -> (PluginManager, Arc<StubBackend>, Arc<NullInstaller>) {
        let loader = Arc::new(FixedLoader::default());
        let backend = Arc::new(StubBackend::default());
        let mut d = descriptor("clock-panel", PluginType::Panel, class);
        d.dir = PathBuf::from(dir);
        loader.put(
            PathBuf::from("/plugins"),
            (d, Some(Arc::clone(&backend) as Arc<dyn BackendPlugin>)),
        );
        let installer = Arc::new(NullInstaller::default());
        let m = manager(loader, Arc::clone(&installer));
        m.init().await.unwrap();
        (m, backend, installer)
    }

    #[tokio::test]
    async fn core_plugins_cannot_be_installed_over_or_removed() {
        let (m, backend, installer) = setup("/plugins/clock-panel", PluginClass::Core).await;
        let id = PluginId::from_static("clock-panel");
        let token = CancellationToken::new();

        let err = m
            .install(&token, &id, "2.0.0", InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotInstallCore);

        let err = m.uninstall(&token, &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotUninstallCore);

        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);
        assert!(installer.uninstalled.lock().unwrap().is_empty());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn escape_from_plugin_dir_is_refused_without_side_effects() {
        let (m, backend, installer) = setup("/plugins/../etc", PluginClass::External).await;
        let id = PluginId::from_static("clock-panel");

        let err = m.uninstall(&CancellationToken::new(), &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutsideOfPluginDir);

        assert!(m.lookup(&id).is_some());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);
        assert!(installer.uninstalled.lock().unwrap().is_empty());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn uninstall_stops_unregisters_and_removes() {
        let (m, backend, installer) = setup("/plugins/clock-panel", PluginClass::External).await;
        let id = PluginId::from_static("clock-panel");

        m.uninstall(&CancellationToken::new(), &id).await.unwrap();

        assert!(m.lookup(&id).is_none());
        assert!(m.registry().is_empty());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            *installer.uninstalled.lock().unwrap(),
            [PathBuf::from("/plugins/clock-panel")]
        );

        let err = m.uninstall(&CancellationToken::new(), &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInstalled);
        m.shutdown().await;
    }

    #[tokio::test]
    async fn uninstall_with_failing_stop_allows_reinstall() {
        let (m, backend, installer) = setup("/plugins/clock-panel", PluginClass::External).await;
        let id = PluginId::from_static("clock-panel");
        let token = CancellationToken::new();
        backend.fail_stop.store(true, Ordering::SeqCst);

        let err = m.uninstall(&token, &id).await.unwrap_err();
        assert!(err.to_string().contains("stop timed out"));
        assert!(m.registry().is_empty());
        assert!(installer.uninstalled.lock().unwrap().is_empty());

        m.install(&token, &id, "1.0.0", InstallOptions::default())
            .await
            .unwrap();
        assert!(m.lookup(&id).is_some());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn install_that_loads_nothing_fails() {
        let (m, _, _) = setup("/plugins/clock-panel", PluginClass::External).await;
        let id = PluginId::from_static("worldmap-panel");

        let err = m
            .install(&CancellationToken::new(), &id, "1.0.0", InstallOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("worldmap-panel"));
        assert!(m.lookup(&id).is_none());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn same_version_is_a_duplicate() {
        let (m, _, _) = setup("/plugins/clock-panel", PluginClass::External).await;
        let err = m
            .install(
                &CancellationToken::new(),
                &PluginId::from_static("clock-panel"),
                "1.0.0",
                InstallOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateInstall);
        m.shutdown().await;
    }
}
