#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Runtime host for out-of-process backend plugins.
//!
//! This crate owns three things for every plugin: whether it is known
//! ([`PluginRegistry`]), whether it is running ([`Supervisor`]), and how a
//! call reaches it ([`PluginManager`]). Discovery, installation, access
//! policy and the wire transport to a plugin process are supplied by the
//! host through the [`Loader`], [`Installer`], [`RequestValidator`] and
//! [`BackendPlugin`] traits.
//!
//! # Lifecycle
//!
//! A handle is registered, started, may exit and be restarted any number of
//! times by its crash watcher, and is finally decommissioned and removed.
//! Decommissioning is one-way and makes the handle invisible to lookups
//! before it leaves the registry.
//!
//! ```rust
//! use tether_plugins::{PluginRegistry, PluginType};
//!
//! let registry = PluginRegistry::new();
//! assert!(registry.list(&[PluginType::Datasource]).is_empty());
//! ```

pub mod backend;
pub mod config_bridge;
pub mod error;
pub mod handle;
pub mod installer;
pub mod instrumentation;
pub mod loader;
pub mod manager;
pub mod models;
pub mod plugin;
pub mod proxy;
pub mod registry;
pub mod relay;
pub mod security;
pub mod stream;
pub mod supervisor;

pub use backend::{BackendFactory, BackendPlugin, CallResourceResponseSender};
pub use config_bridge::to_manager_config;
pub use error::{ErrorKind, PluginError, PluginResult};
pub use handle::PluginHandle;
pub use installer::{InstallOptions, InstallRequest, Installer, UpdateInfo};
pub use instrumentation::{CallStatus, Endpoint, Instrumentation, TracingInstrumentation};
pub use loader::Loader;
pub use manager::{ManagerConfig, PluginManager, call_resource_error_status};
pub use models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    CollectMetricsResult, DataQuery, DataResponse, DataSourceSettings, HealthStatus,
    PluginContext, QueryDataRequest, QueryDataResponse, StaticRoute, TimeRange,
};
pub use plugin::{
    PluginClass, PluginDescriptor, PluginId, PluginSignature, PluginType, SignatureStatus,
    SignatureType,
};
pub use proxy::IncomingRequest;
pub use registry::PluginRegistry;
pub use relay::{RelayOutcome, ResponseWriter};
pub use security::{AllowAllValidator, DenyAllValidator, RequestValidator};
pub use stream::CallResourceStream;
pub use supervisor::Supervisor;

// Re-exported so hosts and test doubles use the same types.
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
