//! The capability surface of a plugin's backend process.
//!
//! The transport that actually talks to the process lives outside this crate;
//! it is handed in as an `Arc<dyn BackendPlugin>` by the loader.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PluginError, PluginResult};
use crate::models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    CollectMetricsResult, QueryDataRequest, QueryDataResponse,
};
use crate::plugin::PluginId;

/// Receives the chunks of a resource call response.
#[async_trait]
pub trait CallResourceResponseSender: Send + Sync {
    /// Deliver one chunk. Blocks until the receiving side takes it.
    ///
    /// # Errors
    ///
    /// Fails if the stream is closed or the call was cancelled.
    async fn send(&self, response: CallResourceResponse) -> PluginResult<()>;
}

/// A backend plugin process.
///
/// Calls a plugin does not support default to [`PluginError::NotImplemented`].
#[async_trait]
pub trait BackendPlugin: Send + Sync {
    /// Whether this host owns the process lifecycle. Backends supplied by a
    /// factory are not managed and are never started or restarted here.
    fn is_managed(&self) -> bool;

    /// Start (or restart) the process.
    async fn start(&self) -> PluginResult<()>;

    /// Stop the process.
    async fn stop(&self) -> PluginResult<()>;

    /// Whether the process has exited. Must not block.
    fn exited(&self) -> bool;

    /// Run data queries.
    async fn query_data(&self, _request: QueryDataRequest) -> PluginResult<QueryDataResponse> {
        Err(PluginError::NotImplemented)
    }

    /// Serve a resource call, sending one or more chunks to `sender`.
    async fn call_resource(
        &self,
        _request: CallResourceRequest,
        _sender: &dyn CallResourceResponseSender,
    ) -> PluginResult<()> {
        Err(PluginError::NotImplemented)
    }

    /// Check plugin health.
    async fn check_health(&self, _request: CheckHealthRequest) -> PluginResult<CheckHealthResult> {
        Err(PluginError::NotImplemented)
    }

    /// Collect process metrics.
    async fn collect_metrics(&self) -> PluginResult<CollectMetricsResult> {
        Err(PluginError::NotImplemented)
    }
}

/// Builds a backend for a plugin id. Used to register plugins whose backend
/// is provided in-process rather than discovered on disk.
pub type BackendFactory =
    Arc<dyn Fn(&PluginId) -> PluginResult<Arc<dyn BackendPlugin>> + Send + Sync>;
