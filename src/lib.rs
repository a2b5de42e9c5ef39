//! corpus-loader: a pluggable ingestion pipeline for versioned documents.
//!
//! Plugins are declared in a YAML manifest and constructed from a
//! compile-time classname table. Each enabled plugin produces at most one
//! artifact per run; the orchestrator uploads artifacts to the corpus,
//! cleans them up and advances the per-document version marker only after
//! the upload is confirmed. One plugin failing, or panicking, never stops
//! the others.

pub mod cli;
pub mod config;
pub mod contract;
pub mod ingest;
pub mod manifest;
pub mod plugins;
pub mod registry;
pub mod upload;
pub mod version_store;
