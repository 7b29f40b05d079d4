#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Host configuration for the Tether plugin runtime.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tether_config::Config;
//!
//! let config = Config::load(Some(std::path::Path::new("/etc/tether/tether.toml"))).unwrap();
//! println!("external plugins live in {}", config.paths.plugins.display());
//! ```
//!
//! # Precedence
//!
//! 1. The host config file
//! 2. `TETHER_*` environment variables, for fields the file left unset
//! 3. Embedded defaults (`defaults.toml` compiled into the binary)
//!
//! Conversion into the plugin runtime's own settings happens in the
//! runtime's bridge module.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load from an optional file, with the process environment as fallback.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is unreadable or malformed, or
    /// the merged configuration fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path, &env::collect_env_vars())
    }
}
