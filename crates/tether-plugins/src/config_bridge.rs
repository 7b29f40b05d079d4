//! Bridge from `tether_config::Config` to [`ManagerConfig`].
//!
//! The config crate knows nothing about plugins; this is the one place its
//! types are translated into the manager's.

use std::time::Duration;

use tether_config::Config;

use crate::manager::ManagerConfig;

/// Convert host configuration to [`ManagerConfig`].
#[must_use]
pub fn to_manager_config(cfg: &Config) -> ManagerConfig {
    ManagerConfig {
        plugins_path: cfg.paths.plugins.clone(),
        bundled_plugins_path: cfg.paths.bundled_plugins.clone(),
        static_root: cfg.paths.static_root.clone(),
        repo_url: cfg.plugins.repo_url.clone(),
        crash_watch_interval: Duration::from_millis(cfg.plugins.crash_watch_interval_ms),
        build_version: cfg.plugins.build_version.clone(),
    }
}
