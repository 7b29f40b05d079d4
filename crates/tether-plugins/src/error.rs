//! Plugin error types.

use std::path::PathBuf;

use crate::plugin::{PluginId, SignatureStatus};

/// Classification of a [`PluginError`].
///
/// Dispatch and the HTTP boundary branch on the kind, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No live plugin with the requested id.
    NotRegistered,
    /// A plugin with the id is already in the registry.
    AlreadyRegistered,
    /// The plugin does not implement the called method.
    NotImplemented,
    /// The plugin process cannot serve calls right now.
    Unavailable,
    /// The request validator rejected the call.
    AccessDenied,
    /// Install targeted a plugin that is not external.
    CannotInstallCore,
    /// Uninstall targeted a plugin that is not external.
    CannotUninstallCore,
    /// Uninstall targeted an unknown plugin.
    NotInstalled,
    /// The requested version is already installed.
    DuplicateInstall,
    /// The plugin directory lies outside the external-plugins root.
    OutsideOfPluginDir,
    /// A resource call ended without producing a chunk.
    EmptyResourceResponse,
    /// The governing cancellation token fired.
    Cancelled,
    /// Send or close on a stream that was already closed.
    StreamClosed,
    /// The plugin's signature does not allow loading it.
    Signature,
    /// Everything else.
    Internal,
}

/// Errors from plugin operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// No live plugin with the requested id.
    #[error("plugin not registered")]
    NotRegistered,

    /// A plugin with this id is already registered.
    #[error("plugin {0} already registered")]
    AlreadyRegistered(PluginId),

    /// The plugin does not implement the called method.
    #[error("method not implemented")]
    NotImplemented,

    /// The plugin cannot serve calls right now.
    #[error("plugin unavailable")]
    Unavailable,

    /// The request validator rejected the call.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Core and bundled plugins cannot be installed over.
    #[error("cannot install a core plugin")]
    CannotInstallCore,

    /// Core and bundled plugins cannot be removed.
    #[error("cannot uninstall a core plugin")]
    CannotUninstallCore,

    /// No plugin with the id is installed.
    #[error("plugin is not installed")]
    NotInstalled,

    /// The exact version requested is already installed.
    #[error("plugin with ID '{plugin_id}' already exists in '{}'", .existing_dir.display())]
    DuplicateInstall {
        /// Id of the installed plugin.
        plugin_id: PluginId,
        /// Directory holding the existing installation.
        existing_dir: PathBuf,
    },

    /// The plugin directory is not strictly inside the external-plugins root.
    #[error("cannot uninstall a plugin outside of the plugins directory")]
    OutsideOfPluginDir,

    /// The plugin ended a resource call without sending anything.
    #[error("received empty resource response")]
    EmptyResourceResponse,

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Misuse of a closed resource stream. Holds the attempted operation.
    #[error("cannot {0} a closed stream")]
    StreamClosed(&'static str),

    /// Signature verification rejected the plugin.
    #[error("plugin '{plugin_id}' {}", describe_signature(.status))]
    Signature {
        /// The rejected plugin.
        plugin_id: PluginId,
        /// Status reported by the verifier.
        status: SignatureStatus,
    },

    /// The plugin id is malformed.
    #[error("invalid plugin id: {0}")]
    InvalidId(String),

    /// An opaque failure reported by a plugin or collaborator.
    #[error("{0}")]
    Other(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure with operation-specific context.
    #[error("{context}: {source}")]
    Wrapped {
        /// What was being done.
        context: String,
        /// The underlying failure.
        #[source]
        source: Box<PluginError>,
    },
}

fn describe_signature(status: &SignatureStatus) -> &'static str {
    match status {
        SignatureStatus::Invalid => "has an invalid signature",
        SignatureStatus::Modified => "has a modified signature",
        SignatureStatus::Unsigned => "has no signature",
        SignatureStatus::Valid => "has an unknown signature state",
    }
}

impl PluginError {
    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRegistered => ErrorKind::NotRegistered,
            Self::AlreadyRegistered(_) => ErrorKind::AlreadyRegistered,
            Self::NotImplemented => ErrorKind::NotImplemented,
            Self::Unavailable => ErrorKind::Unavailable,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::CannotInstallCore => ErrorKind::CannotInstallCore,
            Self::CannotUninstallCore => ErrorKind::CannotUninstallCore,
            Self::NotInstalled => ErrorKind::NotInstalled,
            Self::DuplicateInstall { .. } => ErrorKind::DuplicateInstall,
            Self::OutsideOfPluginDir => ErrorKind::OutsideOfPluginDir,
            Self::EmptyResourceResponse => ErrorKind::EmptyResourceResponse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::StreamClosed(_) => ErrorKind::StreamClosed,
            Self::Signature { .. } => ErrorKind::Signature,
            Self::InvalidId(_) | Self::Other(_) | Self::Io(_) | Self::Wrapped { .. } => {
                ErrorKind::Internal
            },
        }
    }

    /// Whether this error is passed through every layer unchanged.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotImplemented | ErrorKind::Unavailable)
    }

    /// Attach `context` unless this is a sentinel, which is returned as is.
    #[must_use]
    pub fn wrap(self, context: impl Into<String>) -> Self {
        if self.is_sentinel() {
            return self;
        }
        Self::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
