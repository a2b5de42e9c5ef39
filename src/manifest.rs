/// `manifest` module: loads the declarative plugin manifest consumed by the
/// registry.
///
/// The manifest is the only place where untrusted YAML enters the process.
/// It is an ordered `plugins:` list; per-entry `config` mappings are kept
/// opaque here and handed verbatim to the plugin constructors.
///
/// A manifest that cannot be read or parsed is a fatal startup condition:
/// there is no sensible partial recovery from an unreadable manifest, so
/// both cases propagate as [`ManifestError`]. Per-entry problems (unknown
/// classname, bad plugin config) are not detected here; the registry
/// isolates those.
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read plugin manifest {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse plugin manifest {path}: {message}")]
    Parse { path: String, message: String },
}

/// One declared plugin, immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifestEntry {
    /// Unique key; doubles as the log identity for the entry.
    pub name: String,
    /// Where the implementation lives. Informational in this build: the
    /// registry resolves `classname` against its constructor table.
    #[serde(default)]
    pub path: String,
    /// Constructor symbol resolved by the registry.
    pub classname: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Opaque plugin-specific options, passed verbatim to the constructor.
    #[serde(default = "default_config")]
    pub config: serde_yaml::Value,
}

fn default_enabled() -> bool {
    true
}

fn default_config() -> serde_yaml::Value {
    serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    plugins: Vec<PluginManifestEntry>,
}

/// Reads and parses the manifest, preserving declaration order.
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<PluginManifestEntry>, ManifestError> {
    let path_ref = path.as_ref();
    info!(manifest_path = ?path_ref, "Loading plugin manifest");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, manifest_path = ?path_ref, "Failed to read plugin manifest");
            return Err(ManifestError::Read {
                path: path_ref.display().to_string(),
                message: e.to_string(),
            });
        }
    };

    let raw: RawManifest = match serde_yaml::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = ?e, manifest_path = ?path_ref, "Failed to parse plugin manifest YAML");
            return Err(ManifestError::Parse {
                path: path_ref.display().to_string(),
                message: e.to_string(),
            });
        }
    };

    info!(
        manifest_path = ?path_ref,
        plugins = raw.plugins.len(),
        "Parsed plugin manifest"
    );
    Ok(raw.plugins)
}
