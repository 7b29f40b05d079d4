//! Configuration types for the Tether host.
//!
//! Every struct implements [`Default`] so that a bare `[section]` header in
//! TOML produces a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tether_telemetry::LogConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem locations the plugin host reads from and installs into.
    pub paths: PathsSection,
    /// Plugin repository and supervision settings.
    pub plugins: PluginsSection,
    /// Logging setup.
    pub log: LogConfig,
}

/// Directory layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Root of externally installed plugins. Installs land here and
    /// uninstalls may only remove directories strictly inside it.
    pub plugins: PathBuf,
    /// Plugins shipped alongside the host binary.
    pub bundled_plugins: PathBuf,
    /// Host static root. Core plugins live below `app/plugins`.
    pub static_root: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        let data = data_dir();
        Self {
            plugins: data.join("plugins"),
            bundled_plugins: data.join("plugins-bundled"),
            static_root: data.join("public"),
        }
    }
}

impl PathsSection {
    /// Directory holding core data source plugins.
    #[must_use]
    pub fn core_datasource_dir(&self) -> PathBuf {
        self.static_root
            .join("app")
            .join("plugins")
            .join("datasource")
    }

    /// Directory holding core panel plugins.
    #[must_use]
    pub fn core_panel_dir(&self) -> PathBuf {
        self.static_root.join("app").join("plugins").join("panel")
    }

    /// Join every relative path onto `base`. Absolute paths are kept.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.plugins,
            &mut self.bundled_plugins,
            &mut self.static_root,
        ] {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Plugin repository and supervision settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Repository used when an install does not name one.
    pub repo_url: String,
    /// Poll interval of the crash watcher, in milliseconds.
    pub crash_watch_interval_ms: u64,
    /// Host version reported to the installer.
    pub build_version: String,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_owned(),
            crash_watch_interval_ms: 1000,
            build_version: "0.0.0".to_owned(),
        }
    }
}

/// Repository used when none is configured.
pub const DEFAULT_REPO_URL: &str = "https://grafana.com/api/plugins";

fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tether").map_or_else(
        || PathBuf::from("data"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}
