//! Plugin registry.
//!
//! Maps plugin ids to handles behind a single reader/writer lock. The lock
//! guards map membership only: handles are cloned out as `Arc`s and used
//! after the lock is released, so long-running plugin calls never hold it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::{PluginError, PluginResult};
use crate::handle::PluginHandle;
use crate::plugin::{PluginId, PluginType};

/// Registry of loaded plugins.
///
/// A decommissioned handle stays in the map until
/// [`unregister_and_stop`](Self::unregister_and_stop) removes it, but every
/// lookup-based operation treats it as absent.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<PluginId, Arc<PluginHandle>>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AlreadyRegistered`] if the id is already in the
    /// map, decommissioned or not. The existing entry is left untouched.
    pub fn register(&self, handle: Arc<PluginHandle>) -> PluginResult<()> {
        let mut plugins = self
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = handle.id().clone();
        if plugins.contains_key(&id) {
            return Err(PluginError::AlreadyRegistered(id));
        }
        debug!(plugin_id = %id, "plugin registered");
        plugins.insert(id, handle);
        Ok(())
    }

    /// Raw entry for `id`, including a decommissioned one.
    #[must_use]
    pub fn get(&self, id: &PluginId) -> Option<Arc<PluginHandle>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Live handle for `id`.
    #[must_use]
    pub fn lookup(&self, id: &PluginId) -> Option<Arc<PluginHandle>> {
        self.get(id).filter(|h| !h.is_decommissioned())
    }

    /// Live handle for `id` if it has the given type.
    #[must_use]
    pub fn lookup_by_type(&self, id: &PluginId, plugin_type: PluginType) -> Option<Arc<PluginHandle>> {
        self.lookup(id).filter(|h| h.plugin_type() == plugin_type)
    }

    /// Whether a live handle exists for `id`.
    #[must_use]
    pub fn is_registered(&self, id: &PluginId) -> bool {
        self.lookup(id).is_some()
    }

    /// Snapshot of live handles whose type is in `types`. An empty filter
    /// means every type.
    #[must_use]
    pub fn list(&self, types: &[PluginType]) -> Vec<Arc<PluginHandle>> {
        let wanted: &[PluginType] = if types.is_empty() {
            &PluginType::ALL
        } else {
            types
        };
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|h| !h.is_decommissioned() && wanted.contains(&h.plugin_type()))
            .cloned()
            .collect()
    }

    /// Snapshot of every entry, decommissioned ones included.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<PluginHandle>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Ids of every entry, passed to discovery so known plugins are skipped.
    #[must_use]
    pub fn ids(&self) -> HashSet<PluginId> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// The first live renderer plugin.
    #[must_use]
    pub fn renderer(&self) -> Option<Arc<PluginHandle>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|h| !h.is_decommissioned() && h.is_renderer())
            .cloned()
    }

    /// Number of entries, decommissioned ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decommission `handle`, stop it, then remove it from the map.
    ///
    /// Decommissioning first lets the crash watcher observe the flag and exit
    /// instead of restarting a plugin that is being removed. The entry is
    /// only removed if it is still this exact handle, and it is removed even
    /// when the stop fails so the id can be installed again.
    ///
    /// # Errors
    ///
    /// Propagates the stop failure after the entry is removed.
    pub async fn unregister_and_stop(&self, handle: &Arc<PluginHandle>) -> PluginResult<()> {
        let id = handle.id();
        debug!(plugin_id = %id, "stopping plugin process");
        handle.decommission();
        let stopped = handle.stop().await;

        {
            let mut plugins = self
                .plugins
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if plugins.get(id).is_some_and(|current| Arc::ptr_eq(current, handle)) {
                plugins.remove(id);
            }
        }

        match &stopped {
            Ok(()) => debug!(plugin_id = %id, "plugin unregistered"),
            Err(e) => warn!(plugin_id = %id, error = %e, "plugin unregistered but failed to stop"),
        }
        stopped
    }
}
