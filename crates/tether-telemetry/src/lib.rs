//! Logging for the Tether plugin host.
//!
//! Wraps `tracing-subscriber` so that every binary embedding the host gets the
//! same filter syntax, output formats and rolling-file behaviour.
//!
//! ```rust,no_run
//! use tether_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), tether_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("tether_plugins=debug")
//!     .with_plugin_level("mysql", "trace");
//! setup_logging(&config)?;
//! tracing::info!("plugin host starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, PLUGIN_SPAN, setup_default_logging,
    setup_logging,
};
