//! Version tracking: the freshness gate deciding whether a plugin's
//! expensive work should run at all.
//!
//! A marker per tracked artifact name records the timestamp of the last
//! version successfully processed. Freshness compares a source-reported
//! candidate timestamp against that marker: strictly greater means new
//! work, a missing marker means "never processed", and an unparsable
//! candidate is a caller error that must surface instead of masquerading
//! as "no new version".
//!
//! [`SqliteVersionStore`] is the shipped adapter: one table, one row per
//! tracked name, a fresh connection checked out per operation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{params, Database};
use thiserror::Error;
use tracing::{error, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::TrackerConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached or misbehaved.
    #[error("version store unavailable: {message}")]
    Unavailable { message: String },
    /// A candidate freshness timestamp could not be parsed. A caller
    /// error, never to be interpreted as "no new version".
    #[error("invalid version timestamp {value:?}")]
    InvalidTimestamp { value: String },
}

/// Parses a source-reported version timestamp.
///
/// Accepts RFC 3339 with either a literal `Z` or an explicit offset, plus
/// bare naive datetimes which are taken as UTC.
pub fn parse_version_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = value.parse::<NaiveDateTime>() {
        return Ok(naive.and_utc());
    }
    Err(StoreError::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// Per-name freshness markers, shared by all plugins within a run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Last recorded marker for `name`, or `None` if never processed.
    async fn get_last_version(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Records/overwrites the marker for `name`.
    async fn set_last_version(
        &self,
        name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// True iff no marker exists for `name` or `candidate` is strictly
    /// greater than the stored marker.
    async fn is_new_version_available(
        &self,
        name: &str,
        candidate: &str,
    ) -> Result<bool, StoreError> {
        let candidate_timestamp = parse_version_timestamp(candidate)?;
        match self.get_last_version(name).await? {
            None => Ok(true),
            Some(last) => Ok(candidate_timestamp > last),
        }
    }
}

/// SQLite-backed [`VersionStore`] over a local libSQL database.
///
/// Each operation checks out its own connection so no connection state
/// leaks between plugins. The marker table is created at connect time;
/// an unreachable store at construction is a fatal startup error.
pub struct SqliteVersionStore {
    db: Database,
    table: String,
}

impl SqliteVersionStore {
    pub async fn connect(config: &TrackerConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable {
                    message: format!("failed to create {}: {e}", parent.display()),
                })?;
            }
        }

        let db = libsql::Builder::new_local(&config.db_path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("failed to open {}: {e}", config.db_path.display()),
            })?;

        let store = SqliteVersionStore {
            db,
            // Interpolated into statements below; restricted to a bare
            // identifier by AppConfig validation.
            table: config.table_name.clone(),
        };
        store.ensure_schema().await?;
        info!(
            db_path = %config.db_path.display(),
            table = %store.table,
            "Version store ready"
        );
        Ok(store)
    }

    fn connection(&self) -> Result<libsql::Connection, StoreError> {
        self.db.connect().map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (filename TEXT PRIMARY KEY, tracker TEXT NOT NULL)",
                self.table
            ),
            params![],
        )
        .await
        .map_err(|e| StoreError::Unavailable {
            message: format!("failed to create marker table: {e}"),
        })?;
        Ok(())
    }
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    async fn get_last_version(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT tracker FROM {} WHERE filename = ?1", self.table),
                params![name],
            )
            .await
            .map_err(|e| StoreError::Unavailable {
                message: e.to_string(),
            })?;

        let row = rows.next().await.map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw = row.get::<String>(0).map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })?;

        // Stored values are written by set_last_version as RFC 3339; a
        // value that no longer parses is store corruption, not caller
        // error.
        match parse_version_timestamp(&raw) {
            Ok(timestamp) => Ok(Some(timestamp)),
            Err(_) => {
                error!(name = %name, raw = %raw, "Corrupt version marker in store");
                Err(StoreError::Unavailable {
                    message: format!("corrupt marker for {name:?}: {raw:?}"),
                })
            }
        }
    }

    async fn set_last_version(
        &self,
        name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (filename, tracker) VALUES (?1, ?2) \
                 ON CONFLICT(filename) DO UPDATE SET tracker = excluded.tracker",
                self.table
            ),
            params![name, timestamp.to_rfc3339()],
        )
        .await
        .map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })?;
        info!(name = %name, marker = %timestamp.to_rfc3339(), "Version marker advanced");
        Ok(())
    }
}
