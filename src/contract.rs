//! # contract: the plugin result value and the collaborator traits
//!
//! This module defines the data contract every loader plugin returns
//! ([`PluginResult`]) and the traits the engine is wired through:
//! [`LoaderPlugin`] (the polymorphic unit of work) and [`CorpusUploader`]
//! (the replace-if-exists corpus upload collaborator).
//!
//! ## Interface & Extensibility
//! - Implement [`LoaderPlugin`] to add a new source type; register its
//!   constructor in the registry's builtin table.
//! - Implement [`CorpusUploader`] for alternative corpus backends.
//! - All trait methods are async and `Send + Sync` for use across the
//!   orchestrator's await points.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so integration tests can
//!   script plugin and uploader behavior deterministically. The generated
//!   mocks are exported under the `test-export-mocks` feature.
//!
//! ## Result semantics
//! - `success = false`: no artifact fields are meaningful; the orchestrator
//!   must not upload. `error_message` carries the cause.
//! - `success = true, file_path = None`: "checked, nothing new" — the
//!   explicit skip outcome, normally paired with
//!   `requires_version_update = false`.
//! - `success = true, file_path = Some(..)`: a fresh artifact to upload;
//!   ownership of the file transfers to the orchestrator when `run`
//!   returns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::upload::UploadError;

/// Metadata key naming the plugin kind that produced a result.
pub const META_SOURCE: &str = "source";
/// Metadata key carrying the source version marker a result was built from.
/// The orchestrator advances the freshness marker to this value after a
/// confirmed upload.
pub const META_LAST_UPDATE: &str = "last_update_timestamp";

/// Standardized return value of a plugin invocation.
#[derive(Debug, Clone)]
pub struct PluginResult {
    pub success: bool,
    /// Stable identity: both the corpus display name and the version
    /// tracking key.
    pub display_name: String,
    /// Local artifact produced this run, owned by the orchestrator once
    /// returned.
    pub file_path: Option<PathBuf>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub error_message: Option<String>,
    /// Whether the freshness marker should be advanced after this result.
    pub requires_version_update: bool,
}

impl PluginResult {
    /// Successful run that produced a new artifact.
    pub fn artifact(display_name: impl Into<String>, file_path: PathBuf) -> Self {
        PluginResult {
            success: true,
            display_name: display_name.into(),
            file_path: Some(file_path),
            metadata: None,
            error_message: None,
            requires_version_update: true,
        }
    }

    /// Successful run that found nothing new: no artifact, no marker
    /// advancement.
    pub fn skipped(display_name: impl Into<String>) -> Self {
        PluginResult {
            success: true,
            display_name: display_name.into(),
            file_path: None,
            metadata: None,
            error_message: None,
            requires_version_update: false,
        }
    }

    /// Failed run. The orchestrator will not upload and will not touch the
    /// marker.
    pub fn failed(display_name: impl Into<String>, message: impl Into<String>) -> Self {
        PluginResult {
            success: false,
            display_name: display_name.into(),
            file_path: None,
            metadata: None,
            error_message: Some(message.into()),
            requires_version_update: false,
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_version_update(mut self, requires_version_update: bool) -> Self {
        self.requires_version_update = requires_version_update;
        self
    }

    /// Convenience lookup into the metadata mapping.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }
}

/// Why a declared plugin could not be turned into a running instance.
/// Always isolated to its manifest entry by the registry.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no plugin class registered for {classname:?}")]
    UnknownClass { classname: String },
    #[error("duplicate plugin name {name:?} in manifest")]
    DuplicateName { name: String },
    #[error("invalid plugin config: {message}")]
    InvalidConfig { message: String },
    #[error("plugin construction failed: {message}")]
    Construction { message: String },
}

/// The capability every loader plugin implements.
///
/// `run` is a total function from "invoked" to [`PluginResult`]: a plugin
/// converts its own failures into `success = false` results instead of
/// panicking. The orchestrator still guards the call, but a panic is a
/// contract violation, not a supported failure path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait LoaderPlugin: Send + Sync {
    async fn run(&self) -> PluginResult;
}

/// Replace-if-exists upload into the managed corpus.
///
/// Implementors own the replace semantics (any prior artifact with the
/// same display name is removed first) and their own bounded retry for
/// transient failures. The orchestrator treats `upload` as one fallible
/// call that yields the opaque resource name of the stored artifact.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CorpusUploader: Send + Sync {
    async fn upload(&self, display_name: &str, local_path: &Path)
        -> Result<String, UploadError>;
}
