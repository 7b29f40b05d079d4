//! Mock implementations of the plugin host's collaborator traits.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tether_plugins::{
    BackendFactory, BackendPlugin, CallResourceRequest, CallResourceResponse,
    CallResourceResponseSender, CancellationToken, CheckHealthRequest, CheckHealthResult,
    CollectMetricsResult, HeaderMap, InstallRequest, Installer, Loader, PluginDescriptor,
    PluginError, PluginHandle, PluginId, PluginResult, QueryDataRequest, QueryDataResponse,
    ResponseWriter, StatusCode, UpdateInfo,
};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scriptable backend plugin.
///
/// Every capability records its calls. Capabilities without a scripted
/// result fall back to [`PluginError::NotImplemented`].
#[derive(Debug)]
pub struct MockBackend {
    managed: bool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    exited: AtomicBool,
    failing_starts: AtomicUsize,
    stop_error: Mutex<Option<String>>,
    chunks: Mutex<Vec<CallResourceResponse>>,
    resource_error: Mutex<Option<PluginError>>,
    hang_after_chunks: AtomicBool,
    resource_requests: Mutex<Vec<CallResourceRequest>>,
    query_response: Mutex<Option<QueryDataResponse>>,
    health: Mutex<Option<CheckHealthResult>>,
    metrics: Mutex<Option<CollectMetricsResult>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A managed backend that starts cleanly and never exits on its own.
    #[must_use]
    pub fn new() -> Self {
        Self {
            managed: true,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            exited: AtomicBool::new(false),
            failing_starts: AtomicUsize::new(0),
            stop_error: Mutex::new(None),
            chunks: Mutex::new(Vec::new()),
            resource_error: Mutex::new(None),
            hang_after_chunks: AtomicBool::new(false),
            resource_requests: Mutex::new(Vec::new()),
            query_response: Mutex::new(None),
            health: Mutex::new(None),
            metrics: Mutex::new(None),
        }
    }

    /// A backend whose lifecycle belongs to a factory.
    #[must_use]
    pub fn unmanaged() -> Self {
        Self {
            managed: false,
            ..Self::new()
        }
    }

    /// Chunks sent, in order, by every resource call.
    #[must_use]
    pub fn with_chunks(self, chunks: Vec<CallResourceResponse>) -> Self {
        *locked(&self.chunks) = chunks;
        self
    }

    /// Error returned by the next resource call, after its chunks.
    #[must_use]
    pub fn with_resource_error(self, error: PluginError) -> Self {
        *locked(&self.resource_error) = Some(error);
        self
    }

    /// Make resource calls wait forever once their chunks are sent.
    #[must_use]
    pub fn hanging_after_chunks(self) -> Self {
        self.hang_after_chunks.store(true, Ordering::SeqCst);
        self
    }

    /// Response to data queries.
    #[must_use]
    pub fn with_query_response(self, response: QueryDataResponse) -> Self {
        *locked(&self.query_response) = Some(response);
        self
    }

    /// Result of health checks.
    #[must_use]
    pub fn with_health(self, result: CheckHealthResult) -> Self {
        *locked(&self.health) = Some(result);
        self
    }

    /// Result of metrics collection.
    #[must_use]
    pub fn with_metrics(self, result: CollectMetricsResult) -> Self {
        *locked(&self.metrics) = Some(result);
        self
    }

    /// Make every stop fail with `message`.
    #[must_use]
    pub fn with_stop_error(self, message: impl Into<String>) -> Self {
        *locked(&self.stop_error) = Some(message.into());
        self
    }

    /// Make the next `n` starts fail.
    pub fn fail_next_starts(&self, n: usize) {
        self.failing_starts.store(n, Ordering::SeqCst);
    }

    /// Simulate the process dying (or coming back).
    pub fn set_exited(&self, exited: bool) {
        self.exited.store(exited, Ordering::SeqCst);
    }

    /// Number of start attempts, failed ones included.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of stop calls.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Every resource request received, in order.
    #[must_use]
    pub fn resource_requests(&self) -> Vec<CallResourceRequest> {
        locked(&self.resource_requests).clone()
    }
}

#[async_trait]
impl BackendPlugin for MockBackend {
    fn is_managed(&self) -> bool {
        self.managed
    }

    async fn start(&self) -> PluginResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(PluginError::Other("failed to spawn plugin process".into()));
        }
        self.exited.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> PluginResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        match locked(&self.stop_error).clone() {
            Some(message) => Err(PluginError::Other(message)),
            None => Ok(()),
        }
    }

    fn exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    async fn query_data(&self, _request: QueryDataRequest) -> PluginResult<QueryDataResponse> {
        locked(&self.query_response)
            .clone()
            .ok_or(PluginError::NotImplemented)
    }

    async fn call_resource(
        &self,
        request: CallResourceRequest,
        sender: &dyn CallResourceResponseSender,
    ) -> PluginResult<()> {
        locked(&self.resource_requests).push(request);
        let chunks = locked(&self.chunks).clone();
        for chunk in chunks {
            sender.send(chunk).await?;
        }
        if self.hang_after_chunks.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match locked(&self.resource_error).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn check_health(&self, _request: CheckHealthRequest) -> PluginResult<CheckHealthResult> {
        locked(&self.health).clone().ok_or(PluginError::NotImplemented)
    }

    async fn collect_metrics(&self) -> PluginResult<CollectMetricsResult> {
        locked(&self.metrics).clone().ok_or(PluginError::NotImplemented)
    }
}

type Template = (PluginDescriptor, Option<Arc<dyn BackendPlugin>>);

/// Loader that serves plugin templates registered per directory.
///
/// Every discovery builds fresh handles from the templates, so a test can
/// swap what a directory contains between calls.
#[derive(Default)]
pub struct MockLoader {
    plugins: Mutex<HashMap<PathBuf, Vec<Template>>>,
    discover_calls: Mutex<Vec<Vec<PathBuf>>>,
    factory_paths: Mutex<Vec<PathBuf>>,
}

impl std::fmt::Debug for MockLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLoader")
            .field("discover_calls", &self.discover_calls)
            .finish_non_exhaustive()
    }
}

impl MockLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin found under `dir`.
    pub fn add(
        &self,
        dir: impl Into<PathBuf>,
        descriptor: PluginDescriptor,
        backend: Option<Arc<dyn BackendPlugin>>,
    ) {
        locked(&self.plugins)
            .entry(dir.into())
            .or_default()
            .push((descriptor, backend));
    }

    /// Remove every plugin found under `dir`.
    pub fn clear(&self, dir: &Path) {
        locked(&self.plugins).remove(dir);
    }

    /// Directory lists passed to each `discover` call, in order.
    #[must_use]
    pub fn discover_calls(&self) -> Vec<Vec<PathBuf>> {
        locked(&self.discover_calls).clone()
    }

    /// Paths passed to `load_with_factory`, in order.
    #[must_use]
    pub fn factory_paths(&self) -> Vec<PathBuf> {
        locked(&self.factory_paths).clone()
    }
}

#[async_trait]
impl Loader for MockLoader {
    async fn discover(
        &self,
        paths: &[PathBuf],
        known: &HashSet<PluginId>,
    ) -> PluginResult<Vec<PluginHandle>> {
        locked(&self.discover_calls).push(paths.to_vec());
        let plugins = locked(&self.plugins);
        Ok(paths
            .iter()
            .filter_map(|path| plugins.get(path))
            .flatten()
            .filter(|(descriptor, _)| !known.contains(&descriptor.id))
            .map(|(descriptor, backend)| PluginHandle::new(descriptor.clone(), backend.clone()))
            .collect())
    }

    async fn load_with_factory(
        &self,
        path: &Path,
        factory: BackendFactory,
    ) -> PluginResult<PluginHandle> {
        locked(&self.factory_paths).push(path.to_path_buf());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PluginError::Other(format!("no plugin at {}", path.display())))?;
        let id = PluginId::new(name)?;
        let backend = factory(&id)?;
        let descriptor = crate::fixtures::test_descriptor(
            name,
            tether_plugins::PluginType::Datasource,
            tether_plugins::PluginClass::Core,
            path,
        );
        Ok(PluginHandle::new(descriptor, Some(backend)))
    }
}

/// A call received by [`MockInstaller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerCall {
    /// `get_update_info`.
    GetUpdateInfo {
        /// Plugin looked up.
        plugin_id: PluginId,
        /// Requested version.
        version: String,
        /// Repository queried.
        repo_url: String,
    },
    /// `install`.
    Install(InstallRequest),
    /// `uninstall`.
    Uninstall(PathBuf),
}

/// Installer that records calls and touches nothing on disk.
#[derive(Debug, Default)]
pub struct MockInstaller {
    calls: Mutex<Vec<InstallerCall>>,
    archive_url: Mutex<String>,
    install_error: Mutex<Option<String>>,
}

impl MockInstaller {
    /// Create an installer whose update lookups resolve to an empty URL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive URL returned by update lookups.
    #[must_use]
    pub fn with_archive_url(self, url: impl Into<String>) -> Self {
        *locked(&self.archive_url) = url.into();
        self
    }

    /// Make every install fail with `message`.
    #[must_use]
    pub fn with_install_error(self, message: impl Into<String>) -> Self {
        *locked(&self.install_error) = Some(message.into());
        self
    }

    /// Every call received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<InstallerCall> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl Installer for MockInstaller {
    async fn install(&self, _token: &CancellationToken, request: InstallRequest) -> PluginResult<()> {
        locked(&self.calls).push(InstallerCall::Install(request));
        match locked(&self.install_error).clone() {
            Some(message) => Err(PluginError::Other(message)),
            None => Ok(()),
        }
    }

    async fn uninstall(&self, _token: &CancellationToken, dir: &Path) -> PluginResult<()> {
        locked(&self.calls).push(InstallerCall::Uninstall(dir.to_path_buf()));
        Ok(())
    }

    async fn get_update_info(
        &self,
        plugin_id: &PluginId,
        version: &str,
        repo_url: &str,
    ) -> PluginResult<UpdateInfo> {
        locked(&self.calls).push(InstallerCall::GetUpdateInfo {
            plugin_id: plugin_id.clone(),
            version: version.to_owned(),
            repo_url: repo_url.to_owned(),
        });
        Ok(UpdateInfo {
            archive_url: locked(&self.archive_url).clone(),
        })
    }
}

/// In-memory [`ResponseWriter`] that records everything written to it.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    /// Headers as collected and committed.
    pub headers: HeaderMap,
    /// Every status written, in order.
    pub statuses: Vec<StatusCode>,
    /// Concatenated body bytes.
    pub body: Vec<u8>,
    /// Number of flushes.
    pub flushes: usize,
    /// Number of body writes.
    pub writes: usize,
}

impl RecordingWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.statuses.first().copied()
    }

    /// Body as UTF-8 text.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON, or `Null` if it is not JSON.
    #[must_use]
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.statuses.push(status);
    }

    async fn write_body(&mut self, body: &[u8]) -> io::Result<()> {
        self.writes = self.writes.saturating_add(1);
        self.body.extend_from_slice(body);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.flushes = self.flushes.saturating_add(1);
        Ok(())
    }

    fn is_committed(&self) -> bool {
        !self.statuses.is_empty() || !self.body.is_empty()
    }
}
