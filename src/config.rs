//! Process configuration, read once from the environment at startup.
//!
//! All components receive their settings from an [`AppConfig`] constructed
//! in the CLI layer; nothing reads environment variables after startup
//! except plugins resolving their own credentials at run time.

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {var} is not set")]
    MissingVar { var: String },
    #[error("environment variable {var} is invalid: {message}")]
    InvalidVar { var: String, message: String },
}

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub corpus: CorpusConfig,
}

/// Settings for the version-tracking store.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Path of the local SQLite database file.
    pub db_path: PathBuf,
    /// Table holding the freshness markers. Validated as a bare SQL
    /// identifier because it is interpolated into statements.
    pub table_name: String,
}

/// Settings for the retrieval-corpus API.
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    pub base_url: String,
    pub corpus_name: String,
    pub api_key: String,
}

impl AppConfig {
    /// Builds the configuration from environment variables.
    ///
    /// Required: `CORPUS_BASE_URL`, `CORPUS_NAME`, `CORPUS_API_KEY`.
    /// Optional: `TRACKER_DB_PATH` (default `./file_tracker.db`),
    /// `TRACKER_TABLE_NAME` (default `file_tracker`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = PathBuf::from(env_with_default("TRACKER_DB_PATH", "./file_tracker.db"));
        let table_name = env_with_default("TRACKER_TABLE_NAME", "file_tracker");
        if !is_valid_identifier(&table_name) {
            return Err(ConfigError::InvalidVar {
                var: "TRACKER_TABLE_NAME".to_string(),
                message: format!("{table_name:?} is not a plain SQL identifier"),
            });
        }

        let base_url = required_env("CORPUS_BASE_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidVar {
                var: "CORPUS_BASE_URL".to_string(),
                message: format!("{base_url:?} must start with http:// or https://"),
            });
        }
        let corpus_name = required_env("CORPUS_NAME")?;
        if corpus_name.contains('/') {
            return Err(ConfigError::InvalidVar {
                var: "CORPUS_NAME".to_string(),
                message: format!("{corpus_name:?} must not contain '/'"),
            });
        }
        let api_key = required_env("CORPUS_API_KEY")?;

        let config = AppConfig {
            tracker: TrackerConfig {
                db_path,
                table_name,
            },
            corpus: CorpusConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                corpus_name,
                api_key,
            },
        };
        info!(
            db_path = %config.tracker.db_path.display(),
            table = %config.tracker.table_name,
            corpus = %config.corpus.corpus_name,
            "Configuration loaded from environment"
        );
        Ok(config)
    }
}

fn required_env(var: &str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar {
            var: var.to_string(),
        }),
    }
}

fn env_with_default(var: &str, default: &str) -> String {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
