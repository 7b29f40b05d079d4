//! Per-call telemetry around plugin requests.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ErrorKind, PluginResult};
use crate::plugin::PluginId;

/// The plugin capability a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Data query.
    QueryData,
    /// Resource call.
    CallResource,
    /// Health check.
    CheckHealth,
    /// Metrics collection.
    CollectMetrics,
}

impl Endpoint {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueryData => "queryData",
            Self::CallResource => "callResource",
            Self::CheckHealth => "checkHealth",
            Self::CollectMetrics => "collectMetrics",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    /// Returned successfully.
    Ok,
    /// Abandoned because its token was cancelled.
    Cancelled,
    /// Returned an error.
    Error,
}

impl CallStatus {
    /// Status of a finished call.
    #[must_use]
    pub fn of<T>(result: &PluginResult<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) if e.kind() == ErrorKind::Cancelled => Self::Cancelled,
            Err(_) => Self::Error,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

/// Receives one record per plugin call. Must not block.
pub trait Instrumentation: Send + Sync {
    /// Record a finished call.
    fn record(&self, plugin_id: &PluginId, endpoint: Endpoint, status: CallStatus, elapsed: Duration);
}

/// Logs every call at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn record(&self, plugin_id: &PluginId, endpoint: Endpoint, status: CallStatus, elapsed: Duration) {
        debug!(
            plugin_id = %plugin_id,
            endpoint = endpoint.as_str(),
            status = status.as_str(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "plugin request completed"
        );
    }
}

/// Run `call` and record its outcome. The result is returned untouched.
pub async fn measure<T, F>(
    instrumentation: &dyn Instrumentation,
    plugin_id: &PluginId,
    endpoint: Endpoint,
    call: F,
) -> PluginResult<T>
where
    F: Future<Output = PluginResult<T>>,
{
    let started = Instant::now();
    let result = call.await;
    instrumentation.record(plugin_id, endpoint, CallStatus::of(&result), started.elapsed());
    result
}
