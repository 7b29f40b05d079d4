//! Request and response types exchanged with backend plugins.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::plugin::PluginId;

/// Settings of the data source instance a call targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceSettings {
    /// Numeric id.
    pub id: i64,
    /// Stable unique id.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// Upstream URL, checked by the request validator.
    pub url: String,
    /// Raw JSON settings as stored by the host.
    pub json_data: Vec<u8>,
}

/// Who a call is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContext {
    /// Target plugin.
    pub plugin_id: PluginId,
    /// Organization making the call.
    pub org_id: i64,
    /// Present when the call targets a data source instance.
    pub data_source: Option<DataSourceSettings>,
}

impl PluginContext {
    /// A context with no data source attached.
    #[must_use]
    pub fn new(plugin_id: PluginId, org_id: i64) -> Self {
        Self {
            plugin_id,
            org_id,
            data_source: None,
        }
    }

    /// Attach data source settings.
    #[must_use]
    pub fn with_data_source(mut self, settings: DataSourceSettings) -> Self {
        self.data_source = Some(settings);
        self
    }

    /// URL of the attached data source, if any.
    #[must_use]
    pub fn data_source_url(&self) -> Option<&str> {
        self.data_source.as_ref().map(|ds| ds.url.as_str())
    }
}

/// Time window of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start.
    pub from: SystemTime,
    /// Inclusive end.
    pub to: SystemTime,
}

/// A single query inside a [`QueryDataRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataQuery {
    /// Caller-assigned id used to key the response.
    pub ref_id: String,
    /// Plugin-specific query kind.
    pub query_type: String,
    /// Suggested sampling interval.
    pub interval: Duration,
    /// Upper bound on returned points.
    pub max_data_points: i64,
    /// Window to query.
    pub time_range: TimeRange,
    /// Plugin-specific query model.
    pub json: serde_json::Value,
}

/// Query request sent to a data source plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDataRequest {
    /// Target and data source.
    pub plugin_context: PluginContext,
    /// Forwarded request headers.
    pub headers: HashMap<String, String>,
    /// Queries to run.
    pub queries: Vec<DataQuery>,
}

/// Result for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    /// Encoded data frames.
    pub frames: Vec<serde_json::Value>,
    /// Per-query error.
    pub error: Option<String>,
}

/// Query results keyed by `ref_id`. The default value is the empty result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataResponse {
    /// Results keyed by query `ref_id`.
    pub responses: HashMap<String, DataResponse>,
}

/// Health check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckHealthRequest {
    /// Target and data source.
    pub plugin_context: PluginContext,
}

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The plugin could not tell.
    #[default]
    Unknown,
    /// Healthy.
    Ok,
    /// Unhealthy.
    Error,
    /// The caller may not check this data source.
    Forbidden,
}

/// Health check result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHealthResult {
    /// Overall status.
    pub status: HealthStatus,
    /// Human-readable summary.
    pub message: String,
    /// Plugin-specific details as JSON.
    #[serde(default)]
    pub json_details: Vec<u8>,
}

impl CheckHealthResult {
    /// The result returned when the request validator rejects a check.
    #[must_use]
    pub fn forbidden() -> Self {
        Self {
            status: HealthStatus::Forbidden,
            message: "Access denied".to_owned(),
            json_details: Vec::new(),
        }
    }
}

/// Metrics scraped from a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectMetricsResult {
    /// Prometheus text exposition.
    pub prometheus_metrics: Vec<u8>,
}

/// Resource call forwarded to a plugin.
#[derive(Debug, Clone)]
pub struct CallResourceRequest {
    /// Target and data source.
    pub plugin_context: PluginContext,
    /// Resource path.
    pub path: String,
    /// HTTP method.
    pub method: Method,
    /// Path plus the inbound query string.
    pub url: String,
    /// Prepared request headers.
    pub headers: HeaderMap,
    /// Fully buffered request body.
    pub body: Vec<u8>,
}

/// One chunk of a resource call response.
///
/// Only the first chunk's headers and status are used.
#[derive(Debug, Clone, Default)]
pub struct CallResourceResponse {
    /// Response status; `200 OK` when absent.
    pub status: Option<StatusCode>,
    /// Response headers.
    pub headers: Option<HeaderMap>,
    /// Body bytes of this chunk.
    pub body: Vec<u8>,
}

impl CallResourceResponse {
    /// A chunk carrying only body bytes.
    #[must_use]
    pub fn body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: None,
            headers: None,
            body: body.into(),
        }
    }

    /// A chunk carrying status, headers and body.
    #[must_use]
    pub fn with_head(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(status),
            headers: Some(headers),
            body: body.into(),
        }
    }
}

/// Route from a plugin to the directory its static assets are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    /// Owning plugin.
    pub plugin_id: PluginId,
    /// Asset directory.
    pub directory: std::path::PathBuf,
}
