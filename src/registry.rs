//! Plugin registry: turns the declarative manifest into ready-to-run
//! plugin instances.
//!
//! Resolution is a compile-time factory map from `classname` to a
//! constructor function, so "plugins declared by name in config" works
//! without any runtime reflection. Every per-entry problem (unknown
//! class, bad config, construction failure, duplicate name) is logged and
//! isolated to that entry; only an unreadable manifest aborts loading.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::contract::{LoaderPlugin, PluginError};
use crate::manifest::{self, ManifestError, PluginManifestEntry};
use crate::plugins;
use crate::version_store::VersionStore;

/// Everything a plugin constructor receives: its manifest name, its
/// opaque config mapping, and the shared version store.
pub struct PluginContext {
    pub name: String,
    pub settings: serde_yaml::Value,
    pub store: Arc<dyn VersionStore>,
}

/// Constructor entry in the factory map.
pub type PluginConstructor = fn(PluginContext) -> Result<Box<dyn LoaderPlugin>, PluginError>;

/// A constructed plugin paired with its manifest entry.
pub struct LoadedPlugin {
    pub name: String,
    pub instance: Box<dyn LoaderPlugin>,
    pub entry: PluginManifestEntry,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

pub struct PluginRegistry {
    manifest_path: PathBuf,
    store: Arc<dyn VersionStore>,
    constructors: HashMap<String, PluginConstructor>,
}

impl PluginRegistry {
    /// Registry over the builtin plugin classes.
    pub fn new(manifest_path: PathBuf, store: Arc<dyn VersionStore>) -> Self {
        PluginRegistry {
            manifest_path,
            store,
            constructors: plugins::builtin_constructors(),
        }
    }

    /// Registry with an explicit constructor table. Used by tests to load
    /// scripted plugin classes.
    pub fn with_constructors(
        manifest_path: PathBuf,
        store: Arc<dyn VersionStore>,
        constructors: HashMap<String, PluginConstructor>,
    ) -> Self {
        PluginRegistry {
            manifest_path,
            store,
            constructors,
        }
    }

    /// Loads the manifest and constructs every enabled plugin, in
    /// declaration order.
    ///
    /// Fails only on [`ManifestError`]; anything wrong with an individual
    /// entry omits that entry and continues.
    pub fn load_all(&self) -> Result<Vec<LoadedPlugin>, ManifestError> {
        let entries = manifest::load_manifest(&self.manifest_path)?;

        let mut loaded: Vec<LoadedPlugin> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in entries {
            if !entry.enabled {
                info!(plugin = %entry.name, "Plugin disabled, skipping");
                continue;
            }
            if !seen.insert(entry.name.clone()) {
                let e = PluginError::DuplicateName {
                    name: entry.name.clone(),
                };
                error!(plugin = %entry.name, error = %e, "Plugin entry omitted");
                continue;
            }
            let Some(constructor) = self.constructors.get(&entry.classname) else {
                let e = PluginError::UnknownClass {
                    classname: entry.classname.clone(),
                };
                error!(plugin = %entry.name, error = %e, "Plugin entry omitted");
                continue;
            };

            let context = PluginContext {
                name: entry.name.clone(),
                settings: entry.config.clone(),
                store: Arc::clone(&self.store),
            };
            match constructor(context) {
                Ok(instance) => {
                    info!(
                        plugin = %entry.name,
                        classname = %entry.classname,
                        "Plugin loaded"
                    );
                    loaded.push(LoadedPlugin {
                        name: entry.name.clone(),
                        instance,
                        entry,
                    });
                }
                Err(e) => {
                    error!(plugin = %entry.name, error = %e, "Plugin entry omitted");
                }
            }
        }

        info!(count = loaded.len(), "Plugin registry loaded");
        Ok(loaded)
    }
}
