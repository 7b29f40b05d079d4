//! Subscriber setup for the plugin host.
//!
//! Every plugin handle logs inside a `plugin` span carrying its id, so the
//! filter can raise or lower verbosity for one plugin without touching the
//! rest of the host.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

/// Name of the span every plugin handle logs in.
pub const PLUGIN_SPAN: &str = "plugin";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Rotation of file logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// A new file every day.
    #[default]
    Daily,
    /// A new file every hour.
    Hourly,
    /// A single file.
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line output for terminals.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Rolling files in a directory.
    File(PathBuf),
}

/// Rolling file settings, read only for [`LogTarget::File`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// File name prefix; the rotation date is appended.
    pub prefix: String,
    /// Rotation.
    pub rotation: FileRotation,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            prefix: "tether".to_owned(),
            rotation: FileRotation::Daily,
        }
    }
}

/// Host logging settings, usually read from the `[log]` table of the host
/// configuration.
///
/// ```toml
/// [log]
/// level = "info"
/// format = "json"
///
/// [log.plugins]
/// mysql = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter, e.g. `info` or `warn,tether_plugins=debug`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Destination.
    pub target: LogTarget,
    /// Rolling file settings.
    pub file: FileLogConfig,
    /// Prefix lines with a timestamp.
    pub timestamps: bool,
    /// Colorize output. Always off for file targets.
    pub ansi: bool,
    /// Extra filter directives, applied after `level`.
    pub directives: Vec<String>,
    /// Level overrides for events logged on behalf of one plugin, keyed by
    /// plugin id.
    pub plugins: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Pretty,
            target: LogTarget::Stderr,
            file: FileLogConfig::default(),
            timestamps: true,
            ansi: true,
            directives: Vec::new(),
            plugins: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Defaults with the given base level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the destination.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a raw filter directive such as `tether_plugins::relay=trace`.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Log everything one plugin does at `level`.
    #[must_use]
    pub fn with_plugin_level(mut self, plugin_id: impl Into<String>, level: impl Into<String>) -> Self {
        self.plugins.insert(plugin_id.into(), level.into());
        self
    }

    /// Every directive the filter is built from, in application order.
    fn all_directives(&self) -> impl Iterator<Item = String> + '_ {
        let plugins = self
            .plugins
            .iter()
            .map(|(id, level)| format!("[{PLUGIN_SPAN}{{plugin_id={id}}}]={level}"));
        self.directives.iter().cloned().chain(plugins)
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::Config(format!("invalid level '{}': {e}", self.level)))?;
        for directive in self.all_directives() {
            let parsed = directive.parse::<Directive>().map_err(|e| {
                TelemetryError::Config(format!("invalid directive '{directive}': {e}"))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// [`TelemetryError::Config`] for a bad level, directive or plugin
/// override; [`TelemetryError::Io`] if the log directory cannot be created;
/// [`TelemetryError::Init`] if a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => fmt_layer(config, std::io::stdout, config.ansi),
        LogTarget::Stderr => fmt_layer(config, std::io::stderr, config.ansi),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                RollingFileAppender::new(config.file.rotation.into(), dir, &config.file.prefix);
            fmt_layer(config, appender, false)
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

/// Install `info`-level pretty logging on stderr.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}
