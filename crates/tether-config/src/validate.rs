//! Post-merge configuration validation.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_paths(config)?;
    validate_plugins(config)?;
    Ok(())
}

fn validate_paths(config: &Config) -> ConfigResult<()> {
    let p = &config.paths;
    for (field, path) in [
        ("paths.plugins", &p.plugins),
        ("paths.bundled_plugins", &p.bundled_plugins),
        ("paths.static_root", &p.static_root),
    ] {
        require_non_empty(field, path)?;
    }
    Ok(())
}

fn require_non_empty(field: &str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError {
            field: field.to_owned(),
            message: "path must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    let p = &config.plugins;

    if p.crash_watch_interval_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "plugins.crash_watch_interval_ms".to_owned(),
            message: "interval must be at least 1 millisecond".to_owned(),
        });
    }

    if !(p.repo_url.starts_with("https://") || p.repo_url.starts_with("http://")) {
        return Err(ConfigError::ValidationError {
            field: "plugins.repo_url".to_owned(),
            message: format!("'{}' is not an http(s) URL", p.repo_url),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut config = Config::default();
        config.plugins.crash_watch_interval_ms = 0;
        let err = validate(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "plugins.crash_watch_interval_ms"
        ));
    }

    #[test]
    fn non_http_repo_rejected() {
        let mut config = Config::default();
        config.plugins.repo_url = "ftp://mirror.example.com".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn empty_path_rejected() {
        let mut config = Config::default();
        config.paths.static_root = PathBuf::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("paths.static_root"));
    }
}
