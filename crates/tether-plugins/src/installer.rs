//! Plugin installation seam.
//!
//! Downloading, verifying and unpacking archives happen behind
//! [`Installer`]; the manager decides when to call it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PluginResult;
use crate::plugin::PluginId;

/// Caller-supplied install options. Unset fields are filled in from the
/// manager's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Target directory; defaults to the external-plugins root.
    pub install_dir: Option<PathBuf>,
    /// Plugin repository; defaults to the configured repository URL.
    pub repo_url: Option<String>,
    /// Archive to install; defaults to the URL resolved by an update lookup.
    pub archive_url: Option<String>,
}

/// Fully resolved install request handed to the [`Installer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Plugin to install.
    pub plugin_id: PluginId,
    /// Version to install.
    pub version: String,
    /// Directory to unpack into.
    pub install_dir: PathBuf,
    /// Archive to download, if already resolved.
    pub archive_url: Option<String>,
    /// Plugin repository.
    pub repo_url: String,
    /// Version of the host, for compatibility checks against the repository.
    pub host_version: String,
}

/// Update metadata for a plugin version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Where the archive for the version can be downloaded.
    pub archive_url: String,
}

/// Places plugin files on disk and removes them.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Download, verify and unpack a plugin.
    ///
    /// # Errors
    ///
    /// Any download, verification or filesystem failure.
    async fn install(&self, token: &CancellationToken, request: InstallRequest) -> PluginResult<()>;

    /// Remove a plugin directory.
    ///
    /// # Errors
    ///
    /// Any filesystem failure.
    async fn uninstall(&self, token: &CancellationToken, dir: &Path) -> PluginResult<()>;

    /// Resolve where `version` of `plugin_id` can be downloaded from.
    ///
    /// # Errors
    ///
    /// Fails if the repository cannot be reached or has no such version.
    async fn get_update_info(
        &self,
        plugin_id: &PluginId,
        version: &str,
        repo_url: &str,
    ) -> PluginResult<UpdateInfo>;
}
