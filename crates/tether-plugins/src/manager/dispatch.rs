//! Data queries, health checks and metrics collection.

use tracing::Instrument;

use super::PluginManager;
use crate::error::{PluginError, PluginResult};
use crate::instrumentation::{Endpoint, measure};
use crate::models::{
    CheckHealthRequest, CheckHealthResult, CollectMetricsResult, PluginContext, QueryDataRequest,
    QueryDataResponse,
};
use crate::plugin::PluginId;

impl PluginManager {
    /// Run data queries against the plugin named in the request context.
    ///
    /// An unknown plugin yields an empty response rather than an error.
    ///
    /// # Errors
    ///
    /// Sentinel errors pass through unchanged; anything else is wrapped with
    /// "failed to query data".
    pub async fn query_data(&self, request: QueryDataRequest) -> PluginResult<QueryDataResponse> {
        let Some(handle) = self.registry.lookup(&request.plugin_context.plugin_id) else {
            return Ok(QueryDataResponse::default());
        };

        measure(
            &*self.instrumentation,
            handle.id(),
            Endpoint::QueryData,
            handle.query_data(request),
        )
        .instrument(handle.logger().clone())
        .await
        .map_err(|e| e.wrap("failed to query data"))
    }

    /// Check the health of a plugin.
    ///
    /// A call the request validator rejects returns
    /// [`CheckHealthResult::forbidden`] instead of an error.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotRegistered`] for an unknown plugin. Sentinel errors
    /// pass through; anything else is wrapped with "failed to check plugin
    /// health".
    pub async fn check_health(&self, plugin_context: PluginContext) -> PluginResult<CheckHealthResult> {
        if self
            .validator
            .validate(plugin_context.data_source_url(), None)
            .is_err()
        {
            return Ok(CheckHealthResult::forbidden());
        }

        let handle = self
            .registry
            .lookup(&plugin_context.plugin_id)
            .ok_or(PluginError::NotRegistered)?;

        measure(
            &*self.instrumentation,
            handle.id(),
            Endpoint::CheckHealth,
            handle.check_health(CheckHealthRequest { plugin_context }),
        )
        .instrument(handle.logger().clone())
        .await
        .map_err(|e| e.wrap("failed to check plugin health"))
    }

    /// Collect metrics from a plugin. Not subject to request validation.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotRegistered`] for an unknown plugin. Sentinel errors
    /// pass through; anything else is wrapped with "failed to collect
    /// metrics".
    pub async fn collect_metrics(&self, plugin_id: &PluginId) -> PluginResult<CollectMetricsResult> {
        let handle = self
            .registry
            .lookup(plugin_id)
            .ok_or(PluginError::NotRegistered)?;

        measure(
            &*self.instrumentation,
            handle.id(),
            Endpoint::CollectMetrics,
            handle.collect_metrics(),
        )
        .instrument(handle.logger().clone())
        .await
        .map_err(|e| e.wrap("failed to collect metrics"))
    }
}
