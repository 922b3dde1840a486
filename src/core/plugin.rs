// Bundler plugin hooks
// Plugins are strategy objects consulted by the bundler before its own resolution and loading

use crate::core::models::ImportKind;
use crate::utils::Result;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments passed to resolve hooks
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    /// Import specifier as written, or the entry point path
    pub path: String,
    /// Module doing the import, `None` for entry points
    pub importer: Option<PathBuf>,
    /// Directory relative specifiers are resolved against
    pub resolve_dir: PathBuf,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    /// Resolved file path, or the specifier to keep when external
    pub path: String,
    pub external: bool,
}

impl ResolveResult {
    pub fn external(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            external: true,
        }
    }

    pub fn internal(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            external: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadArgs {
    pub path: PathBuf,
}

/// How loaded contents are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Ts,
    Js,
    Json,
}

impl Loader {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        match extension {
            "ts" | "mts" | "cts" | "tsx" => Some(Loader::Ts),
            "js" | "mjs" | "cjs" | "jsx" => Some(Loader::Js),
            "json" => Some(Loader::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub contents: String,
    /// Falls back to the loader implied by the path
    pub loader: Option<Loader>,
}

/// Hooks a bundler consults before its built-in behavior.
///
/// A hook only runs for paths its filter matches; a plugin without a filter
/// for a hook does not take part in that phase. Returning `Ok(None)` defers
/// to the next plugin, then to the bundler.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn resolve_filter(&self) -> Option<&Regex> {
        None
    }

    fn load_filter(&self) -> Option<&Regex> {
        None
    }

    async fn on_resolve(&self, _args: &ResolveArgs) -> Result<Option<ResolveResult>> {
        Ok(None)
    }

    async fn on_load(&self, _args: &LoadArgs) -> Result<Option<LoadResult>> {
        Ok(None)
    }
}

/// Runs plugin hooks in registration order, first answer wins
#[derive(Clone, Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn from_plugins(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub async fn resolve(&self, args: &ResolveArgs) -> Result<Option<ResolveResult>> {
        for plugin in &self.plugins {
            let matches = plugin
                .resolve_filter()
                .map(|filter| filter.is_match(&args.path))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            if let Some(result) = plugin.on_resolve(args).await? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    pub async fn load(&self, args: &LoadArgs) -> Result<Option<LoadResult>> {
        let path = args.path.to_string_lossy();
        for plugin in &self.plugins {
            let matches = plugin
                .load_filter()
                .map(|filter| filter.is_match(&path))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            if let Some(result) = plugin.on_load(args).await? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }
}
