use crate::core::compiler_options::{CompilerOptions, EmitMode};
use crate::core::diagnostics::Diagnostic;
use crate::core::models::*;
use crate::core::plugin::Plugin;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    /// Every regular file under `dir`, recursively, sorted.
    async fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TypeCheckRequest {
    pub root_files: Vec<PathBuf>,
    pub options: CompilerOptions,
    pub emit: EmitMode,
    pub root_dir: PathBuf,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct TypeCheckOutput {
    pub pre_emit_diagnostics: Vec<Diagnostic>,
    pub emit_diagnostics: Vec<Diagnostic>,
    /// Declaration files produced in memory, empty unless declarations were requested.
    pub emitted_files: Vec<OutputFile>,
    pub emit_skipped: bool,
}

/// Static analysis over a set of root files, optionally emitting declarations
#[async_trait]
pub trait TypeChecker: Send + Sync {
    /// Prefix used in formatted diagnostics and failures.
    fn name(&self) -> &str;
    async fn check(&self, request: &TypeCheckRequest) -> Result<TypeCheckOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// One artifact per entry point, mirrored under `dir` relative to `base`.
    OutDir {
        dir: PathBuf,
        base: PathBuf,
        extension: String,
    },
    OutFile(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMapMode {
    None,
    Inline,
}

#[derive(Clone)]
pub struct BundleRequest {
    pub entry_points: Vec<PathBuf>,
    /// Inline local imports transitively when true.
    pub bundle: bool,
    pub minify: bool,
    pub platform: Platform,
    pub format: ModuleFormat,
    pub output: OutputTarget,
    pub source_map: SourceMapMode,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub external: Vec<String>,
    pub metafile: bool,
    pub banner: Option<String>,
    pub working_directory: PathBuf,
}

impl std::fmt::Debug for BundleRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleRequest")
            .field("entry_points", &self.entry_points)
            .field("bundle", &self.bundle)
            .field("minify", &self.minify)
            .field("platform", &self.platform)
            .field("format", &self.format)
            .field("output", &self.output)
            .field("source_map", &self.source_map)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("external", &self.external)
            .field("metafile", &self.metafile)
            .field("banner", &self.banner.is_some())
            .field("working_directory", &self.working_directory)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub output_files: Vec<OutputFile>,
    pub metafile: Option<Metafile>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Resolves and emits a module graph
#[async_trait]
pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;
    async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput>;
}
