//! CLI glue for corpus-loader: argument parsing and the async entrypoint.
//!
//! Fatal errors here are limited to environment configuration, the version
//! store being unreachable and an unloadable manifest. Individual plugin
//! failures are reported in the run summary and never change the exit
//! status.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::ingest;
use crate::registry::PluginRegistry;
use crate::upload::{CorpusClient, HttpCorpusApi};
use crate::version_store::{SqliteVersionStore, VersionStore};

/// CLI for corpus-loader: run manifest-declared loader plugins against a corpus.
#[derive(Parser)]
#[clap(
    name = "corpus-loader",
    version,
    about = "Ingest versioned documents from pluggable sources into a document corpus"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute one ingestion pass over every enabled plugin in the manifest
    Run {
        /// Path to the YAML plugin manifest
        #[clap(long)]
        manifest: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { manifest } => {
            let config = AppConfig::from_env()?;
            let store: Arc<dyn VersionStore> =
                Arc::new(SqliteVersionStore::connect(&config.tracker).await?);

            let registry = PluginRegistry::new(manifest, Arc::clone(&store));
            let plugins = registry.load_all()?;
            info!(command = "run", plugins = plugins.len(), "Plugins loaded");

            let api = HttpCorpusApi::new(&config.corpus);
            let uploader = CorpusClient::new(api);
            let report = ingest::run_once(plugins, &uploader, store.as_ref()).await;
            info!(
                command = "run",
                uploaded = report.uploaded(),
                skipped = report.skipped(),
                failed = report.failed(),
                "Ingestion pass complete"
            );
            Ok(())
        }
    }
}
