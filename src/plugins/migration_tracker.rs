//! Loader plugin for a tracked issue spreadsheet.
//!
//! Fetches the sheet's cheap update-time marker first and only pulls and
//! renders the full worksheet when the version store reports the marker
//! as new. Rendering is deterministic: the same worksheet state always
//! produces the same bytes, which keeps version-gating meaningful.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::contract::{LoaderPlugin, PluginError, PluginResult, META_LAST_UPDATE, META_SOURCE};
use crate::plugins::{write_artifact, SourceError};
use crate::registry::PluginContext;
use crate::version_store::VersionStore;

/// Stable column label map, by worksheet column index. Indices 19-29 are
/// noisy per-stack flags and stay unlabeled.
const COLUMN_LABELS: [(usize, &str); 24] = [
    (0, "Item ID"),
    (1, "Issue Description"),
    (2, "Raised By"),
    (3, "Status"),
    (4, "Parent Issue"),
    (5, "Priority"),
    (6, "Area"),
    (7, "Type"),
    (8, "Topic"),
    (9, "Context/Notes"),
    (10, "Log URL"),
    (11, "Impact/Workaround"),
    (12, "Customer/Org"),
    (13, "Response"),
    (14, "Jira ID"),
    (15, "Target Release"),
    (16, "Release Date"),
    (17, "EA Critical Issue"),
    (18, "G17 Critical Issue"),
    (30, "Critical Issue"),
    (31, "Date Created"),
    (32, "Date Closed"),
    (33, "Days Open"),
    (34, "Reference Link"),
];

/// Columns folded into the one-line summary under each item header.
const SUMMARY_FIELDS: [usize; 5] = [5, 3, 6, 7, 8];

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationTrackerConfig {
    pub sheet_id: String,
    pub worksheet_id: String,
    /// Display name in the corpus and key in the version store.
    pub tracked_name: String,
    pub api_base_url: String,
    /// Environment variable holding the sheets API token, resolved at run
    /// time.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "SHEETS_API_TOKEN".to_string()
}

/// Source access for the tracker sheet, mockable for tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// The sheet's last-update timestamp; cheap relative to a full fetch.
    async fn last_update_time(&self) -> Result<String, SourceError>;
    /// All worksheet cells, row-major.
    async fn worksheet_rows(&self) -> Result<Vec<Vec<String>>, SourceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetMetadataResponse {
    last_update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorksheetValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

pub struct HttpSheetsClient {
    http: reqwest::Client,
    api_base_url: String,
    sheet_id: String,
    worksheet_id: String,
    token_env: String,
}

impl HttpSheetsClient {
    pub fn new(config: &MigrationTrackerConfig) -> Self {
        HttpSheetsClient {
            http: reqwest::Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            sheet_id: config.sheet_id.clone(),
            worksheet_id: config.worksheet_id.clone(),
            token_env: config.token_env.clone(),
        }
    }

    fn token(&self) -> Result<String, SourceError> {
        std::env::var(&self.token_env).map_err(|_| SourceError::MissingCredential {
            var: self.token_env.clone(),
        })
    }
}

#[async_trait]
impl SheetsClient for HttpSheetsClient {
    async fn last_update_time(&self) -> Result<String, SourceError> {
        let token = self.token()?;
        let url = format!("{}/sheets/{}/metadata", self.api_base_url, self.sheet_id);
        info!(url = %url, "Fetching sheet metadata");
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Sheet metadata request failed");
            return Err(SourceError::Status { status, url });
        }
        let metadata =
            response
                .json::<SheetMetadataResponse>()
                .await
                .map_err(|e| SourceError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
        metadata.last_update_time.ok_or(SourceError::MissingVersion)
    }

    async fn worksheet_rows(&self) -> Result<Vec<Vec<String>>, SourceError> {
        let token = self.token()?;
        let url = format!(
            "{}/sheets/{}/worksheets/{}/values",
            self.api_base_url, self.sheet_id, self.worksheet_id
        );
        info!(url = %url, "Fetching worksheet values");
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Worksheet values request failed");
            return Err(SourceError::Status { status, url });
        }
        let payload =
            response
                .json::<WorksheetValuesResponse>()
                .await
                .map_err(|e| SourceError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
        Ok(payload.values)
    }
}

pub struct MigrationTracker {
    tracked_name: String,
    client: Box<dyn SheetsClient>,
    store: Arc<dyn VersionStore>,
}

/// Registry constructor for `classname: MigrationTracker`.
pub fn construct(context: PluginContext) -> Result<Box<dyn LoaderPlugin>, PluginError> {
    let config: MigrationTrackerConfig =
        serde_yaml::from_value(context.settings).map_err(|e| PluginError::InvalidConfig {
            message: e.to_string(),
        })?;
    let client = HttpSheetsClient::new(&config);
    Ok(Box::new(MigrationTracker::new(
        config.tracked_name,
        Box::new(client),
        context.store,
    )))
}

impl MigrationTracker {
    pub fn new(
        tracked_name: String,
        client: Box<dyn SheetsClient>,
        store: Arc<dyn VersionStore>,
    ) -> Self {
        MigrationTracker {
            tracked_name,
            client,
            store,
        }
    }

    async fn execute(&self) -> Result<PluginResult, SourceError> {
        let marker = self.client.last_update_time().await?;
        info!(tracked = %self.tracked_name, marker = %marker, "Sheet version marker fetched");

        if !self
            .store
            .is_new_version_available(&self.tracked_name, &marker)
            .await?
        {
            info!(tracked = %self.tracked_name, "No new sheet version, skipping");
            return Ok(PluginResult::skipped(&self.tracked_name));
        }

        let rows = self.client.worksheet_rows().await?;
        let content = render_tracker_rows(&rows);

        let mut metadata = BTreeMap::new();
        metadata.insert(META_SOURCE.to_string(), "migration_tracker".to_string());
        metadata.insert(META_LAST_UPDATE.to_string(), marker.clone());

        if content.is_empty() {
            // Version inspected and consumed, nothing rendered to publish.
            info!(tracked = %self.tracked_name, "No tracked rows in worksheet, nothing to publish");
            return Ok(PluginResult::skipped(&self.tracked_name)
                .with_metadata(metadata)
                .with_version_update(true));
        }

        let path = write_artifact(&content, "txt")?;
        info!(
            tracked = %self.tracked_name,
            rows = rows.len(),
            path = %path.display(),
            "Rendered tracker artifact"
        );
        Ok(PluginResult::artifact(&self.tracked_name, path).with_metadata(metadata))
    }
}

#[async_trait]
impl LoaderPlugin for MigrationTracker {
    async fn run(&self) -> PluginResult {
        info!(tracked = %self.tracked_name, "Migration tracker plugin invoked");
        match self.execute().await {
            Ok(result) => result,
            Err(e) => {
                error!(tracked = %self.tracked_name, error = %e, "Migration tracker run failed");
                PluginResult::failed(&self.tracked_name, e.to_string())
            }
        }
    }
}

fn column_label(index: usize) -> Option<&'static str> {
    COLUMN_LABELS
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, label)| *label)
}

fn cell(row: &[String], index: usize) -> Option<&str> {
    row.get(index)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn is_tracked_item(item_id: &str) -> bool {
    let lower = item_id.to_lowercase();
    ["item", "a-item", "legacy"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Renders worksheet rows into the text artifact.
///
/// Rows whose first cell does not match the item-identity pattern are
/// dropped (this also discards repeated header rows and spacer rows).
/// Each kept row becomes a block: the item header, the issue description,
/// a one-line summary of the [`SUMMARY_FIELDS`] columns joined by `" | "`,
/// then every other labeled, non-empty column. Blocks are joined by a
/// fixed 40-dash separator line. Returns an empty string when no row
/// qualifies.
pub fn render_tracker_rows(rows: &[Vec<String>]) -> String {
    let mut blocks: Vec<String> = Vec::new();

    for row in rows {
        let Some(item_id) = cell(row, 0) else {
            continue;
        };
        if !is_tracked_item(item_id) {
            continue;
        }

        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("Item ID: {item_id}"));

        if let Some(description) = cell(row, 1) {
            lines.push(format!(
                "Issue Description: {}",
                description.replace('\n', " ")
            ));
        }

        let summary: Vec<String> = SUMMARY_FIELDS
            .iter()
            .filter_map(|&index| {
                let label = column_label(index)?;
                let value = cell(row, index)?;
                Some(format!("{label}: {value}"))
            })
            .collect();
        if !summary.is_empty() {
            lines.push(summary.join(" | "));
        }

        for (index, label) in COLUMN_LABELS {
            if index == 0 || index == 1 || SUMMARY_FIELDS.contains(&index) {
                continue;
            }
            if let Some(value) = cell(row, index) {
                lines.push(format!("{label}: {value}"));
            }
        }

        blocks.push(lines.join("\n"));
    }

    if blocks.is_empty() {
        return String::new();
    }
    format!("\n{}", blocks.join(&format!("\n{}\n", "-".repeat(40))))
}
