//! Loader plugin for a single document held in an HTTP vault.
//!
//! Freshness rides on the vault's `Last-Modified` header, normalized to
//! RFC 3339 UTC before it reaches the version store. Markdown documents
//! pass through untouched; HTML is reduced to a minimal markdown-ish text
//! form before upload.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{error, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::contract::{LoaderPlugin, PluginError, PluginResult, META_LAST_UPDATE, META_SOURCE};
use crate::plugins::{write_artifact, SourceError};
use crate::registry::PluginContext;
use crate::version_store::VersionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    Html,
}

impl Default for DocumentFormat {
    fn default() -> Self {
        DocumentFormat::Markdown
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultDocumentConfig {
    /// Full URL of the vault document.
    pub url: String,
    /// Display name in the corpus and key in the version store.
    pub tracked_name: String,
    #[serde(default)]
    pub format: DocumentFormat,
    /// Environment variable holding the vault token, resolved at run time.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "VAULT_API_TOKEN".to_string()
}

/// Vault access, mockable for tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// The document's current version marker as RFC 3339 UTC.
    async fn document_version(&self) -> Result<String, SourceError>;
    /// The full document body.
    async fn fetch_document(&self) -> Result<String, SourceError>;
}

pub struct HttpVaultClient {
    http: reqwest::Client,
    url: String,
    token_env: String,
}

impl HttpVaultClient {
    pub fn new(config: &VaultDocumentConfig) -> Self {
        HttpVaultClient {
            http: reqwest::Client::new(),
            url: config.url.clone(),
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
impl VaultClient for HttpVaultClient {
    async fn document_version(&self) -> Result<String, SourceError> {
        let token = self.token()?;
        info!(url = %self.url, "Probing vault document version");
        let response = self.http.head(&self.url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %self.url, "Vault version probe failed");
            return Err(SourceError::Status {
                status,
                url: self.url.clone(),
            });
        }

        let Some(last_modified) = response.headers().get(reqwest::header::LAST_MODIFIED) else {
            return Err(SourceError::MissingVersion);
        };
        let raw = last_modified.to_str().map_err(|e| SourceError::Decode {
            url: self.url.clone(),
            message: format!("unreadable Last-Modified header: {e}"),
        })?;
        let parsed = DateTime::parse_from_rfc2822(raw).map_err(|e| SourceError::Decode {
            url: self.url.clone(),
            message: format!("invalid Last-Modified header {raw:?}: {e}"),
        })?;
        Ok(parsed.with_timezone(&Utc).to_rfc3339())
    }

    async fn fetch_document(&self) -> Result<String, SourceError> {
        let token = self.token()?;
        info!(url = %self.url, "Fetching vault document");
        let response = self.http.get(&self.url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %self.url, "Vault document fetch failed");
            return Err(SourceError::Status {
                status,
                url: self.url.clone(),
            });
        }
        Ok(response.text().await?)
    }
}

pub struct VaultDocument {
    tracked_name: String,
    format: DocumentFormat,
    client: Box<dyn VaultClient>,
    store: Arc<dyn VersionStore>,
}

/// Registry constructor for `classname: VaultDocument`.
pub fn construct(context: PluginContext) -> Result<Box<dyn LoaderPlugin>, PluginError> {
    let config: VaultDocumentConfig =
        serde_yaml::from_value(context.settings).map_err(|e| PluginError::InvalidConfig {
            message: e.to_string(),
        })?;
    let client = HttpVaultClient::new(&config);
    Ok(Box::new(VaultDocument::new(
        config.tracked_name,
        config.format,
        Box::new(client),
        context.store,
    )))
}

impl VaultDocument {
    pub fn new(
        tracked_name: String,
        format: DocumentFormat,
        client: Box<dyn VaultClient>,
        store: Arc<dyn VersionStore>,
    ) -> Self {
        VaultDocument {
            tracked_name,
            format,
            client,
            store,
        }
    }

    async fn execute(&self) -> Result<PluginResult, SourceError> {
        let marker = self.client.document_version().await?;
        info!(tracked = %self.tracked_name, marker = %marker, "Vault version marker fetched");

        if !self
            .store
            .is_new_version_available(&self.tracked_name, &marker)
            .await?
        {
            info!(tracked = %self.tracked_name, "No new vault version, skipping");
            return Ok(PluginResult::skipped(&self.tracked_name));
        }

        let body = self.client.fetch_document().await?;
        let content = match self.format {
            DocumentFormat::Markdown => body,
            DocumentFormat::Html => strip_html_minimal(&body),
        };

        let path = write_artifact(&content, "md")?;
        info!(
            tracked = %self.tracked_name,
            bytes = content.len(),
            path = %path.display(),
            "Vault artifact written"
        );

        let mut metadata = BTreeMap::new();
        metadata.insert(META_SOURCE.to_string(), "vault_document".to_string());
        metadata.insert(META_LAST_UPDATE.to_string(), marker);
        Ok(PluginResult::artifact(&self.tracked_name, path).with_metadata(metadata))
    }
}

#[async_trait]
impl LoaderPlugin for VaultDocument {
    async fn run(&self) -> PluginResult {
        info!(tracked = %self.tracked_name, "Vault document plugin invoked");
        match self.execute().await {
            Ok(result) => result,
            Err(e) => {
                error!(tracked = %self.tracked_name, error = %e, "Vault document run failed");
                PluginResult::failed(&self.tracked_name, e.to_string())
            }
        }
    }
}

/// Minimal HTML-to-text reduction: headings become `#` prefixes, block
/// elements become line breaks, scripts and styles vanish, every other
/// tag is stripped and common entities are decoded.
pub fn strip_html_minimal(html: &str) -> String {
    let mut text = Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .unwrap()
        .replace_all(html, "")
        .to_string();
    for level in (1..=6).rev() {
        text = text.replace(
            &format!("<h{level}>"),
            &format!("\n{} ", "#".repeat(level)),
        );
        text = text.replace(&format!("</h{level}>"), "\n");
    }
    text = text.replace("<p>", "\n\n").replace("</p>", "\n");
    text = text.replace("<br>", "\n").replace("<br/>", "\n");
    text = text.replace("<ul>", "\n").replace("</ul>", "\n");
    text = text.replace("<ol>", "\n").replace("</ol>", "\n");
    text = text.replace("<li>", "- ").replace("</li>", "\n");
    text = Regex::new(r"<[^>]+>")
        .unwrap()
        .replace_all(&text, "")
        .to_string();
    text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    text
}
