//! High-level pipeline: drives one pass over all loaded plugins.
//!
//! For each plugin, in registry order, the pass invokes `run()`,
//! interprets the returned [`PluginResult`], uploads any produced artifact
//! through the [`CorpusUploader`] collaborator, cleans up the local file,
//! and advances the version marker once the upload is durable.
//!
//! # Major Types
//! - [`IngestReport`]: per-plugin outcomes plus summary counts
//! - [`Outcome`]: the terminal state of one plugin invocation
//!
//! # Failure isolation
//! One plugin can never prevent the rest from running. A panic out of
//! `run()` is caught at this boundary and recorded as [`Outcome::FailedHard`];
//! a `success = false` result, a failed upload, or a failed marker write is
//! [`Outcome::FailedSoft`]. The pass always completes and returns a report.
//!
//! # Marker rule
//! The freshness marker is advanced if and only if the upload — when one
//! was required — completed, and the result asked for it
//! (`requires_version_update`). Advancing before a confirmed upload could
//! silently lose an artifact, so a failed upload leaves both the local
//! file (for inspection) and the marker untouched; the replace-if-exists
//! upload makes the next run's retry safe.

use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::contract::{CorpusUploader, PluginResult, META_LAST_UPDATE};
use crate::registry::LoadedPlugin;
use crate::version_store::{parse_version_timestamp, VersionStore};

/// Terminal state of one plugin invocation.
#[derive(Debug)]
pub enum Outcome {
    /// A fresh artifact was uploaded and the local file removed.
    Uploaded {
        display_name: String,
        resource_name: String,
    },
    /// Nothing new to upload.
    Skipped { display_name: String },
    /// The plugin reported failure, or post-processing (upload, marker
    /// write) failed.
    FailedSoft { message: String },
    /// The plugin panicked out of `run()`.
    FailedHard { message: String },
}

#[derive(Debug)]
pub struct PluginOutcome {
    pub plugin: String,
    pub outcome: Outcome,
}

/// Result of one full ingestion pass.
#[derive(Debug)]
pub struct IngestReport {
    pub outcomes: Vec<PluginOutcome>,
}

impl IngestReport {
    pub fn uploaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Uploaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.outcome,
                    Outcome::FailedSoft { .. } | Outcome::FailedHard { .. }
                )
            })
            .count()
    }
}

/// Runs every plugin once, sequentially, in the given order.
///
/// Plugin instances are consumed: they live for exactly one invocation.
pub async fn run_once<U>(
    plugins: Vec<LoadedPlugin>,
    uploader: &U,
    store: &dyn VersionStore,
) -> IngestReport
where
    U: CorpusUploader,
{
    info!(plugins = plugins.len(), "Starting ingestion pass");
    let mut outcomes: Vec<PluginOutcome> = Vec::new();

    for plugin in plugins {
        info!(plugin = %plugin.name, "Running plugin");
        let result = match AssertUnwindSafe(plugin.instance.run()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    plugin = %plugin.name,
                    message = %message,
                    "Plugin panicked, continuing with remaining plugins"
                );
                outcomes.push(PluginOutcome {
                    plugin: plugin.name,
                    outcome: Outcome::FailedHard { message },
                });
                continue;
            }
        };

        let outcome = process_result(&plugin.name, result, uploader, store).await;
        outcomes.push(PluginOutcome {
            plugin: plugin.name,
            outcome,
        });
    }

    let report = IngestReport { outcomes };
    info!(
        uploaded = report.uploaded(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Ingestion pass complete"
    );
    report
}

/// Interprets one plugin result: upload, cleanup, marker advancement.
async fn process_result<U>(
    plugin: &str,
    result: PluginResult,
    uploader: &U,
    store: &dyn VersionStore,
) -> Outcome
where
    U: CorpusUploader,
{
    if !result.success {
        let message = result
            .error_message
            .clone()
            .unwrap_or_else(|| "plugin reported failure without a message".to_string());
        error!(plugin = %plugin, message = %message, "Plugin failed");
        return Outcome::FailedSoft { message };
    }

    if result.display_name.trim().is_empty() {
        // The display name is the corpus identity and the tracking key;
        // without it neither upload nor marker advancement is meaningful.
        error!(plugin = %plugin, "Plugin returned success with an empty display name");
        return Outcome::FailedSoft {
            message: "plugin returned an empty display name".to_string(),
        };
    }

    match result.file_path.clone() {
        Some(path) => {
            info!(
                plugin = %plugin,
                display_name = %result.display_name,
                path = %path.display(),
                "Uploading artifact"
            );
            match uploader.upload(&result.display_name, &path).await {
                Ok(resource_name) => {
                    info!(
                        plugin = %plugin,
                        display_name = %result.display_name,
                        resource = %resource_name,
                        "Upload complete"
                    );
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!(
                            plugin = %plugin,
                            path = %path.display(),
                            error = %e,
                            "Failed to remove local artifact"
                        );
                    }
                    if result.requires_version_update {
                        if let Err(message) = advance_marker(plugin, &result, store).await {
                            return Outcome::FailedSoft { message };
                        }
                    }
                    Outcome::Uploaded {
                        display_name: result.display_name,
                        resource_name,
                    }
                }
                Err(e) => {
                    // Artifact and marker stay untouched: the file remains
                    // for inspection and the next run re-attempts.
                    error!(
                        plugin = %plugin,
                        display_name = %result.display_name,
                        path = %path.display(),
                        error = %e,
                        "Upload failed, artifact retained"
                    );
                    Outcome::FailedSoft {
                        message: format!("upload failed: {e}"),
                    }
                }
            }
        }
        None => {
            info!(
                plugin = %plugin,
                display_name = %result.display_name,
                "Nothing new to upload"
            );
            if result.requires_version_update {
                if let Err(message) = advance_marker(plugin, &result, store).await {
                    return Outcome::FailedSoft { message };
                }
            }
            Outcome::Skipped {
                display_name: result.display_name,
            }
        }
    }
}

/// Commits the freshness marker after the durable effect.
///
/// Uses the version the result was built from when the plugin reported
/// one, otherwise the current wall clock.
async fn advance_marker(
    plugin: &str,
    result: &PluginResult,
    store: &dyn VersionStore,
) -> Result<(), String> {
    let timestamp = match result.metadata_value(META_LAST_UPDATE) {
        Some(raw) => match parse_version_timestamp(raw) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                error!(
                    plugin = %plugin,
                    raw = %raw,
                    error = %e,
                    "Result metadata carried an unparsable version timestamp, marker not advanced"
                );
                return Err(format!("marker not advanced: {e}"));
            }
        },
        None => Utc::now(),
    };

    store
        .set_last_version(&result.display_name, timestamp)
        .await
        .map_err(|e| {
            error!(
                plugin = %plugin,
                display_name = %result.display_name,
                error = %e,
                "Failed to advance version marker"
            );
            format!("marker not advanced: {e}")
        })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "plugin panicked".to_string()
    }
}
