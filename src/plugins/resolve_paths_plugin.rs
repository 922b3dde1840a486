// Resolve Paths Plugin: rewrites relative imports to the emitted file extension

use crate::core::models::{ImportKind, ModuleFormat};
use crate::core::plugin::{Plugin, ResolveArgs, ResolveResult};
use crate::utils::{Logger, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static EVERYTHING: Lazy<Regex> = Lazy::new(|| Regex::new(".*").unwrap());

/// Specifiers already naming a runtime file are kept as written.
const RUNTIME_EXTENSIONS: [&str; 4] = [".js", ".mjs", ".cjs", ".json"];

/// Keeps every import external in per-file builds while pointing relative
/// specifiers at the files the build will produce.
///
/// `./thing` becomes `./thing.mjs`, a directory `./lib` becomes
/// `./lib/index.mjs`, and `./thing.ts` becomes `./thing.mjs`.
pub struct ResolveTypescriptPathsPlugin {
    format: ModuleFormat,
}

impl ResolveTypescriptPathsPlugin {
    pub fn new(format: ModuleFormat) -> Self {
        Self { format }
    }

    /// Pure rewrite once the directory probe has been answered.
    pub fn rewrite(&self, specifier: &str, is_directory: bool) -> String {
        let extension = self.format.extension();
        let rewritten = if is_directory {
            format!("{}/index.{}", specifier, extension)
        } else {
            format!("{}.{}", specifier, extension)
        };
        let doubled = format!(".ts.{}", extension);
        match rewritten.strip_suffix(&doubled) {
            Some(stem) => format!("{}.{}", stem, extension),
            None => rewritten,
        }
    }
}

fn keeps_specifier(specifier: &str) -> bool {
    !specifier.starts_with('.') || RUNTIME_EXTENSIONS.iter().any(|ext| specifier.ends_with(ext))
}

#[async_trait]
impl Plugin for ResolveTypescriptPathsPlugin {
    fn name(&self) -> &str {
        "resolve-typescript-paths"
    }

    fn resolve_filter(&self) -> Option<&Regex> {
        Some(&EVERYTHING)
    }

    async fn on_resolve(&self, args: &ResolveArgs) -> Result<Option<ResolveResult>> {
        if args.kind == ImportKind::EntryPoint {
            return Ok(None);
        }
        if keeps_specifier(&args.path) {
            return Ok(Some(ResolveResult::external(args.path.clone())));
        }

        // A missing target is treated as a file
        let is_directory = tokio::fs::symlink_metadata(args.resolve_dir.join(&args.path))
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);

        let rewritten = self.rewrite(&args.path, is_directory);
        Logger::debug(&format!("resolve-typescript-paths: {} -> {}", args.path, rewritten));
        Ok(Some(ResolveResult::external(rewritten)))
    }
}
