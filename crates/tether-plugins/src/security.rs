//! Access validation for calls that reach a data source.
//!
//! The host decides whether a caller may reach a data source URL; this crate
//! only asks. [`AllowAllValidator`] and [`DenyAllValidator`] are provided for
//! tests and for hosts without an access policy.

use crate::error::{PluginError, PluginResult};
use crate::proxy::IncomingRequest;

/// Decides whether a call may proceed.
pub trait RequestValidator: Send + Sync {
    /// Check a call against the data source URL it targets and the inbound
    /// HTTP request, when there is one.
    ///
    /// # Errors
    ///
    /// Returns an error describing the rejection. Callers report it as
    /// access denied regardless of its kind.
    fn validate(
        &self,
        data_source_url: Option<&str>,
        request: Option<&IncomingRequest>,
    ) -> PluginResult<()>;
}

/// Validator that permits every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllValidator;

impl RequestValidator for AllowAllValidator {
    fn validate(
        &self,
        _data_source_url: Option<&str>,
        _request: Option<&IncomingRequest>,
    ) -> PluginResult<()> {
        Ok(())
    }
}

/// Validator that rejects every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllValidator;

impl RequestValidator for DenyAllValidator {
    fn validate(
        &self,
        data_source_url: Option<&str>,
        _request: Option<&IncomingRequest>,
    ) -> PluginResult<()> {
        Err(PluginError::AccessDenied(format!(
            "requests to {} are not allowed",
            data_source_url.unwrap_or("data sources")
        )))
    }
}
