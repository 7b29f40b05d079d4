//! The unit held by the registry.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Span;

use crate::backend::{BackendPlugin, CallResourceResponseSender};
use crate::error::{PluginError, PluginResult};
use crate::models::{
    CallResourceRequest, CheckHealthRequest, CheckHealthResult, CollectMetricsResult,
    QueryDataRequest, QueryDataResponse,
};
use crate::plugin::{PluginClass, PluginDescriptor, PluginId, PluginType};

/// A loaded plugin: immutable identity, an optional backend process and a
/// one-way decommission flag.
///
/// The flag is owned by the handle rather than the registry so the crash
/// watcher can read it without touching the registry lock.
pub struct PluginHandle {
    descriptor: PluginDescriptor,
    backend: Option<Arc<dyn BackendPlugin>>,
    decommissioned: AtomicBool,
    span: Span,
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("id", &self.descriptor.id)
            .field("type", &self.descriptor.plugin_type)
            .field("version", &self.descriptor.version)
            .field("decommissioned", &self.is_decommissioned())
            .finish_non_exhaustive()
    }
}

impl PluginHandle {
    /// Create a handle. `backend` is `None` for frontend-only plugins.
    #[must_use]
    pub fn new(descriptor: PluginDescriptor, backend: Option<Arc<dyn BackendPlugin>>) -> Self {
        let span = tracing::info_span!("plugin", plugin_id = %descriptor.id);
        Self {
            descriptor,
            backend,
            decommissioned: AtomicBool::new(false),
            span,
        }
    }

    /// Identity.
    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Plugin id.
    #[must_use]
    pub fn id(&self) -> &PluginId {
        &self.descriptor.id
    }

    /// Plugin type.
    #[must_use]
    pub fn plugin_type(&self) -> PluginType {
        self.descriptor.plugin_type
    }

    /// Installed version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.descriptor.dir
    }

    /// Core, bundled or external.
    #[must_use]
    pub fn class(&self) -> PluginClass {
        self.descriptor.class
    }

    /// Installed by the operator into the external-plugins directory.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.descriptor.class == PluginClass::External
    }

    /// Declares an out-of-process backend.
    #[must_use]
    pub fn is_backend(&self) -> bool {
        self.descriptor.backend
    }

    /// Process lifecycle is owned by this host.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_managed())
    }

    /// Image renderer plugin.
    #[must_use]
    pub fn is_renderer(&self) -> bool {
        self.descriptor.plugin_type == PluginType::Renderer
    }

    /// Span carrying the plugin id; log plugin-scoped events inside it.
    #[must_use]
    pub fn logger(&self) -> &Span {
        &self.span
    }

    /// Mark the handle as logically removed. Returns `true` for the call that
    /// performed the transition; the flag never goes back.
    pub fn decommission(&self) -> bool {
        !self.decommissioned.swap(true, Ordering::AcqRel)
    }

    /// Whether [`decommission`](Self::decommission) has been called.
    #[must_use]
    pub fn is_decommissioned(&self) -> bool {
        self.decommissioned.load(Ordering::Acquire)
    }

    /// Start the backend process. No-op without a backend.
    ///
    /// # Errors
    ///
    /// Propagates the backend's start failure.
    pub async fn start(&self) -> PluginResult<()> {
        match &self.backend {
            Some(backend) => backend.start().await,
            None => Ok(()),
        }
    }

    /// Stop the backend process. No-op without a backend.
    ///
    /// # Errors
    ///
    /// Propagates the backend's stop failure.
    pub async fn stop(&self) -> PluginResult<()> {
        match &self.backend {
            Some(backend) => backend.stop().await,
            None => Ok(()),
        }
    }

    /// Whether the backend process has exited. `false` without a backend.
    #[must_use]
    pub fn exited(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.exited())
    }

    fn client(&self) -> PluginResult<&Arc<dyn BackendPlugin>> {
        self.backend.as_ref().ok_or(PluginError::Unavailable)
    }

    /// Forward a data query.
    ///
    /// # Errors
    ///
    /// [`PluginError::Unavailable`] without a backend, otherwise the
    /// backend's error.
    pub async fn query_data(&self, request: QueryDataRequest) -> PluginResult<QueryDataResponse> {
        self.client()?.query_data(request).await
    }

    /// Forward a resource call.
    ///
    /// # Errors
    ///
    /// [`PluginError::Unavailable`] without a backend, otherwise the
    /// backend's error.
    pub async fn call_resource(
        &self,
        request: CallResourceRequest,
        sender: &dyn CallResourceResponseSender,
    ) -> PluginResult<()> {
        self.client()?.call_resource(request, sender).await
    }

    /// Forward a health check.
    ///
    /// # Errors
    ///
    /// [`PluginError::Unavailable`] without a backend, otherwise the
    /// backend's error.
    pub async fn check_health(&self, request: CheckHealthRequest) -> PluginResult<CheckHealthResult> {
        self.client()?.check_health(request).await
    }

    /// Collect backend metrics.
    ///
    /// # Errors
    ///
    /// [`PluginError::Unavailable`] without a backend, otherwise the
    /// backend's error.
    pub async fn collect_metrics(&self) -> PluginResult<CollectMetricsResult> {
        self.client()?.collect_metrics().await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::plugin::PluginSignature;

    /// Minimal backend for unit tests in this crate.
    #[derive(Default)]
    pub(crate) struct StubBackend {
        pub(crate) starts: AtomicUsize,
        pub(crate) stops: AtomicUsize,
        pub(crate) exited: AtomicBool,
        pub(crate) unmanaged: bool,
        pub(crate) fail_start: AtomicBool,
        pub(crate) fail_stop: AtomicBool,
        pub(crate) running: AtomicBool,
        /// How long every start after the first takes.
        pub(crate) restart_delay: Option<std::time::Duration>,
        pub(crate) chunks: Mutex<Vec<crate::models::CallResourceResponse>>,
    }

    #[async_trait]
    impl BackendPlugin for StubBackend {
        fn is_managed(&self) -> bool {
            !self.unmanaged
        }

        async fn start(&self) -> PluginResult<()> {
            let previous = self.starts.fetch_add(1, Ordering::SeqCst);
            if previous > 0
                && let Some(delay) = self.restart_delay
            {
                tokio::time::sleep(delay).await;
            }
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(PluginError::Other("spawn failed".into()));
            }
            self.exited.store(false, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> PluginResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(PluginError::Other("stop timed out".into()));
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn exited(&self) -> bool {
            self.exited.load(Ordering::SeqCst)
        }

        async fn call_resource(
            &self,
            _request: CallResourceRequest,
            sender: &dyn CallResourceResponseSender,
        ) -> PluginResult<()> {
            let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
            for chunk in chunks {
                sender.send(chunk).await?;
            }
            Ok(())
        }
    }

    pub(crate) fn descriptor(id: &str, plugin_type: PluginType, class: PluginClass) -> PluginDescriptor {
        PluginDescriptor {
            id: PluginId::from_static(id),
            plugin_type,
            name: id.to_owned(),
            version: "1.0.0".to_owned(),
            class,
            dir: PathBuf::from("/plugins").join(id),
            backend: true,
            signature: PluginSignature::unsigned(),
        }
    }

    pub(crate) fn handle(id: &str, plugin_type: PluginType) -> Arc<PluginHandle> {
        Arc::new(PluginHandle::new(
            descriptor(id, plugin_type, PluginClass::External),
            None,
        ))
    }

    pub(crate) fn backend_handle(id: &str, backend: Arc<StubBackend>) -> Arc<PluginHandle> {
        Arc::new(PluginHandle::new(
            descriptor(id, PluginType::Datasource, PluginClass::External),
            Some(backend as Arc<dyn BackendPlugin>),
        ))
    }
}
