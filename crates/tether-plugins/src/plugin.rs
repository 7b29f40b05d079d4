//! Plugin identity and descriptor types.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Unique, stable plugin identifier.
///
/// Plugin IDs are strings like `"clock-panel"` or `"cloud-monitoring"`.
/// They must be non-empty and contain only lowercase alphanumeric characters,
/// hyphens and underscores, so an id can always be used as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PluginId(String);

/// Deserialize with validation, rejecting ids that could escape a directory.
impl<'de> Deserialize<'de> for PluginId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PluginId {
    /// Create a new `PluginId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidId`] if the id is empty or contains
    /// invalid characters.
    pub fn new(id: impl Into<String>) -> PluginResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a `PluginId` without validation (for tests and internal use).
    #[must_use]
    pub fn from_static(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> PluginResult<()> {
        if id.is_empty() {
            return Err(PluginError::InvalidId("plugin id must not be empty".into()));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(PluginError::InvalidId(format!(
                "plugin id must contain only lowercase alphanumeric characters, hyphens and underscores, got: {id}"
            )));
        }
        if id.starts_with('-') || id.ends_with('-') {
            return Err(PluginError::InvalidId(format!(
                "plugin id must not start or end with a hyphen, got: {id}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a plugin contributes to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Query backend.
    Datasource,
    /// Visualization.
    Panel,
    /// Application bundling pages and other plugins.
    App,
    /// Image renderer.
    Renderer,
    /// Secrets storage backend.
    #[serde(rename = "secretsmanager")]
    SecretsManager,
}

impl PluginType {
    /// Every plugin type; the filter used when a listing names none.
    pub const ALL: [PluginType; 5] = [
        Self::Datasource,
        Self::Panel,
        Self::App,
        Self::Renderer,
        Self::SecretsManager,
    ];

    /// Lowercase name as used in plugin manifests.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Datasource => "datasource",
            Self::Panel => "panel",
            Self::App => "app",
            Self::Renderer => "renderer",
            Self::SecretsManager => "secretsmanager",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a plugin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginClass {
    /// Shipped inside the host's static root.
    Core,
    /// Shipped next to the host in the bundled directory.
    Bundled,
    /// Installed into the external-plugins directory.
    External,
}

/// Signature verification outcome, as reported by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    /// Signed and every file matches.
    Valid,
    /// Signature cannot be verified.
    Invalid,
    /// Files were changed after signing.
    Modified,
    /// No signature present.
    Unsigned,
}

/// Who signed a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
    /// Signed by the host vendor.
    Official,
    /// Signed for a commercial publisher.
    Commercial,
    /// Signed for a community publisher.
    Community,
    /// Signed for private use by one organization.
    Private,
}

/// Signature metadata attached to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSignature {
    /// Verification outcome.
    pub status: SignatureStatus,
    /// Signing organization, if signed.
    #[serde(default)]
    pub org: Option<String>,
    /// Kind of signature, if signed.
    #[serde(default)]
    pub signature_type: Option<SignatureType>,
    /// Paths, relative to the plugin directory, covered by the signature.
    /// `None` means every file may be served.
    #[serde(default)]
    pub signed_files: Option<HashSet<String>>,
}

impl PluginSignature {
    /// An unsigned plugin that may serve any file.
    #[must_use]
    pub fn unsigned() -> Self {
        Self {
            status: SignatureStatus::Unsigned,
            org: None,
            signature_type: None,
            signed_files: None,
        }
    }
}

/// Immutable identity of a plugin, produced by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique id.
    pub id: PluginId,
    /// Plugin type.
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    /// Human-readable name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Core, bundled or external.
    pub class: PluginClass,
    /// Root directory of the plugin's files.
    pub dir: PathBuf,
    /// Whether the plugin has an out-of-process backend.
    #[serde(default)]
    pub backend: bool,
    /// Signature metadata.
    pub signature: PluginSignature,
}

impl PluginDescriptor {
    /// Whether the plugin may serve the file at `path` (relative to its
    /// directory). Core plugins and plugins without a signed-file list may
    /// serve anything.
    #[must_use]
    pub fn includes_file(&self, path: &str) -> bool {
        if self.class == PluginClass::Core {
            return true;
        }
        match &self.signature.signed_files {
            None => true,
            Some(files) => files.contains(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(class: PluginClass, signed_files: Option<&[&str]>) -> PluginDescriptor {
        PluginDescriptor {
            id: PluginId::from_static("worldmap-panel"),
            plugin_type: PluginType::Panel,
            name: "Worldmap".into(),
            version: "1.0.0".into(),
            class,
            dir: PathBuf::from("/plugins/worldmap-panel"),
            backend: false,
            signature: PluginSignature {
                status: SignatureStatus::Valid,
                org: Some("Acme".into()),
                signature_type: Some(SignatureType::Community),
                signed_files: signed_files.map(|f| f.iter().map(|s| (*s).to_owned()).collect()),
            },
        }
    }

    #[test]
    fn valid_plugin_ids() {
        assert!(PluginId::new("clock-panel").is_ok());
        assert!(PluginId::new("cloud_monitoring").is_ok());
        assert!(PluginId::new("plugin123").is_ok());
        assert!(PluginId::new("a").is_ok());
    }

    #[test]
    fn invalid_plugin_ids() {
        assert!(PluginId::new("").is_err());
        assert!(PluginId::new("ClockPanel").is_err());
        assert!(PluginId::new("clock panel").is_err());
        assert!(PluginId::new("../etc").is_err());
        assert!(PluginId::new("-plugin").is_err());
        assert!(PluginId::new("plugin-").is_err());
    }

    #[test]
    fn plugin_id_rejects_traversal_on_deserialize() {
        let result: Result<PluginId, _> = serde_json::from_str("\"../../root\"");
        assert!(result.is_err());
    }

    #[test]
    fn plugin_type_names() {
        assert_eq!(PluginType::Datasource.to_string(), "datasource");
        let parsed: PluginType = serde_json::from_str("\"secretsmanager\"").unwrap();
        assert_eq!(parsed, PluginType::SecretsManager);
    }

    #[test]
    fn core_plugins_serve_any_file() {
        let d = descriptor(PluginClass::Core, Some(&["module.js"]));
        assert!(d.includes_file("img/logo.svg"));
    }

    #[test]
    fn missing_signed_file_list_serves_any_file() {
        let d = descriptor(PluginClass::External, None);
        assert!(d.includes_file("module.js"));
    }

    #[test]
    fn signed_file_list_is_enforced() {
        let d = descriptor(PluginClass::External, Some(&["module.js", "plugin.json"]));
        assert!(d.includes_file("module.js"));
        assert!(!d.includes_file("secrets.txt"));
    }
}
