//! Builtin loader plugins and their shared plumbing.
//!
//! The registry resolves manifest `classname` values against
//! [`builtin_constructors`]; adding a plugin means implementing
//! [`crate::contract::LoaderPlugin`] and registering its constructor here.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::PluginConstructor;
use crate::version_store::StoreError;

pub mod migration_tracker;
pub mod vault_document;

/// The static factory table: manifest `classname` → constructor.
pub fn builtin_constructors() -> HashMap<String, PluginConstructor> {
    let mut constructors: HashMap<String, PluginConstructor> = HashMap::new();
    constructors.insert(
        "MigrationTracker".to_string(),
        migration_tracker::construct as PluginConstructor,
    );
    constructors.insert(
        "VaultDocument".to_string(),
        vault_document::construct as PluginConstructor,
    );
    constructors
}

/// Failures inside a plugin's fetch/transform step. Plugins convert these
/// into `success = false` results at their `run()` boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("credential environment variable {var} is not set")]
    MissingCredential { var: String },
    #[error("source did not report a version marker")]
    MissingVersion,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

/// Writes plugin output to a persisted temporary file and hands the path
/// over to the orchestrator.
///
/// The extension gains a leading dot if it lacks one. The file survives
/// this function on purpose: it is deleted by the orchestrator after a
/// successful upload.
pub fn write_artifact(content: &str, extension: &str) -> Result<PathBuf, std::io::Error> {
    let suffix = if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    };
    let mut file = tempfile::Builder::new()
        .prefix("corpus-loader-")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}
