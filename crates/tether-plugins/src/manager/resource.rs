//! Resource calls and their HTTP error mapping.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, warn};

use super::PluginManager;
use crate::error::{ErrorKind, PluginError, PluginResult};
use crate::instrumentation::{Endpoint, measure};
use crate::models::{CallResourceRequest, PluginContext};
use crate::proxy::{IncomingRequest, clear_cookie_header, keep_cookies, prepare_proxy_headers};
use crate::relay::{ResponseWriter, relay_call_resource};

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    error: String,
}

impl PluginManager {
    /// Serve a resource call, writing the plugin's response or a JSON error
    /// body to `writer`.
    ///
    /// Failures map to `403` (access denied), `503` (plugin unavailable),
    /// `404` (not implemented) or `500`. Nothing is written for a failure
    /// that happens after the response was committed.
    pub async fn call_resource(
        &self,
        token: &CancellationToken,
        plugin_context: PluginContext,
        request: IncomingRequest,
        path: &str,
        writer: &mut dyn ResponseWriter,
    ) {
        if let Err(e) = self
            .try_call_resource(token, plugin_context, request, path, writer)
            .await
        {
            write_call_resource_error(&e, writer).await;
        }
    }

    /// Serve a resource call, returning failures instead of writing them.
    ///
    /// The plugin is resolved before the request validator runs, so an
    /// unknown plugin is rejected without consulting it.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotRegistered`], [`PluginError::AccessDenied`], a body
    /// read failure, or whatever the relay reports.
    pub async fn try_call_resource(
        &self,
        token: &CancellationToken,
        plugin_context: PluginContext,
        mut request: IncomingRequest,
        path: &str,
        writer: &mut dyn ResponseWriter,
    ) -> PluginResult<()> {
        let handle = self
            .registry
            .lookup(&plugin_context.plugin_id)
            .ok_or(PluginError::NotRegistered)?;

        self.validator
            .validate(plugin_context.data_source_url(), Some(&request))
            .map_err(|e| match e {
                PluginError::AccessDenied(_) => e,
                other => PluginError::AccessDenied(other.to_string()),
            })?;

        let keep = plugin_context
            .data_source
            .as_ref()
            .map(|ds| keep_cookies(&ds.json_data, handle.logger()))
            .unwrap_or_default();
        clear_cookie_header(&mut request.headers, &keep);
        prepare_proxy_headers(&mut request.headers, request.remote_addr);
        let body = request.read_body().await?;

        let call = CallResourceRequest {
            plugin_context,
            path: path.to_owned(),
            method: request.method.clone(),
            url: request.resource_url(path),
            headers: std::mem::take(&mut request.headers),
            body,
        };

        measure(
            &*self.instrumentation,
            handle.id(),
            Endpoint::CallResource,
            relay_call_resource(&handle, token, call, writer),
        )
        .instrument(handle.logger().clone())
        .await
    }
}

/// Status and message reported to the client for a failed resource call.
#[must_use]
pub fn call_resource_error_status(err: &PluginError) -> (StatusCode, &'static str) {
    match err.kind() {
        ErrorKind::AccessDenied => (StatusCode::FORBIDDEN, "Access denied"),
        ErrorKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Plugin unavailable"),
        ErrorKind::NotImplemented => (StatusCode::NOT_FOUND, "Not found"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to call resource"),
    }
}

async fn write_call_resource_error(err: &PluginError, writer: &mut dyn ResponseWriter) {
    if writer.is_committed() {
        warn!(error = %err, "resource call failed after the response was committed");
        return;
    }

    let (status, message) = call_resource_error_status(err);
    let body = match serde_json::to_vec(&ErrorBody {
        message,
        error: err.to_string(),
    }) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "failed to encode error response");
            Vec::new()
        },
    };

    writer
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    writer.write_status(status);
    if let Err(e) = writer.write_body(&body).await {
        error!(error = %e, "failed to write error response");
    }
    let _ = writer.flush().await;
}
