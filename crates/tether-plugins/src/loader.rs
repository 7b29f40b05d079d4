//! Plugin discovery seam.
//!
//! Reading manifests, verifying signatures and spawning transports happen
//! behind this trait; the manager only consumes the handles it produces.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::BackendFactory;
use crate::error::PluginResult;
use crate::handle::PluginHandle;
use crate::plugin::PluginId;

/// Turns plugin directories into handles.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Scan `paths` and build a handle for every plugin found whose id is not
    /// in `known`.
    ///
    /// # Errors
    ///
    /// Fails if scanning fails as a whole. Individual plugins that fail to
    /// load are expected to be logged and skipped by the implementation.
    async fn discover(
        &self,
        paths: &[PathBuf],
        known: &HashSet<PluginId>,
    ) -> PluginResult<Vec<PluginHandle>>;

    /// Build a handle for the plugin at `path` whose backend comes from
    /// `factory` instead of a managed process.
    ///
    /// # Errors
    ///
    /// Fails if the plugin cannot be read or the factory fails.
    async fn load_with_factory(
        &self,
        path: &Path,
        factory: BackendFactory,
    ) -> PluginResult<PluginHandle>;
}
