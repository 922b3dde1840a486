use crate::core::compiler_options::{CompilerOptions, EmitMode};
use crate::core::diagnostics::sort_and_deduplicate;
use crate::core::interfaces::*;
use crate::core::models::*;
use crate::core::plugin::Plugin;
use crate::infrastructure::{OxcBundler, OxcTypeChecker, TokioFileSystemService};
use crate::plugins::{ExcludeSourceMapsPlugin, ResolveTypescriptPathsPlugin};
use crate::utils::{BuilderError, Logger, Result, Timer};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prepended to ESM bundles so inlined CommonJS code finds the globals it expects.
pub const ESM_COMPATIBILITY_PREAMBLE: &str = r#"import { createRequire as __createRequire } from "node:module";
import { fileURLToPath as __fileURLToPath } from "node:url";
import { default as __path } from "node:path";
const __filename = __fileURLToPath(import.meta.url);
const __dirname = __path.dirname(__filename);
const require = __createRequire(import.meta.url);"#;

/// Drives one compile: enumerate, type-check, then bundle unless only
/// declarations were asked for.
pub struct CompileService {
    fs_service: Arc<dyn FileSystemService>,
    type_checker: Arc<dyn TypeChecker>,
    bundler: Arc<dyn Bundler>,
}

impl CompileService {
    pub fn new(
        fs_service: Arc<dyn FileSystemService>,
        type_checker: Arc<dyn TypeChecker>,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        Self {
            fs_service,
            type_checker,
            bundler,
        }
    }

    pub async fn compile(&self, options: &CompileOptions) -> Result<CompileResult> {
        let _timer = Timer::start("Compile");
        let working_directory = match &options.working_directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let source_dir = working_directory.join(&options.source_dir);
        let output_dir = working_directory.join(&options.output_dir);
        Logger::compile_start(
            options.output_intent.as_str(),
            &source_dir.display().to_string(),
            &output_dir.display().to_string(),
        );

        let files = self.production_files(&options.mode, &source_dir).await?;
        Logger::found_files(files.len());

        let emitted = self
            .type_check(&files, options.output_intent, &source_dir, &output_dir)
            .await?;

        let format = match options.output_intent.module_format() {
            Some(format) => format,
            None => {
                return Ok(CompileResult {
                    output_files: emitted,
                    metafile: None,
                })
            }
        };

        let request = self.bundle_request(
            options,
            files,
            format,
            &source_dir,
            &output_dir,
            working_directory,
        );
        let output = self.bundler.bundle(request).await?;

        if !output.errors.is_empty() || !output.warnings.is_empty() {
            let bundler = self.bundler.name().to_string();
            let messages = output
                .errors
                .iter()
                .map(|e| format!("{} error: {}", bundler, e))
                .chain(output.warnings.iter().map(|w| format!("{} warning: {}", bundler, w)))
                .collect();
            return Err(BuilderError::Bundle { bundler, messages });
        }

        Ok(CompileResult {
            output_files: output.output_files,
            metafile: output.metafile,
        })
    }

    async fn production_files(&self, mode: &BuildMode, source_dir: &Path) -> Result<Vec<PathBuf>> {
        match mode {
            BuildMode::Bundle { entry_point, .. } => Ok(vec![source_dir.join(entry_point)]),
            BuildMode::PerFile => {
                let files = self.fs_service.list_files(source_dir).await?;
                Ok(files
                    .into_iter()
                    .filter(|file| file.to_string_lossy().ends_with(".ts"))
                    .collect())
            }
        }
    }

    /// Run the checker; any diagnostic fails the compile. Returns the
    /// declaration files emitted for the types-only intent.
    async fn type_check(
        &self,
        files: &[PathBuf],
        intent: OutputIntent,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<Vec<OutputFile>> {
        let emit = match intent {
            OutputIntent::TypesOnly => EmitMode::DeclarationsOnly,
            OutputIntent::Module | OutputIntent::CommonJs => EmitMode::None,
        };
        let request = TypeCheckRequest {
            root_files: files.to_vec(),
            options: CompilerOptions::strict(),
            emit,
            root_dir: source_dir.to_path_buf(),
            out_dir: output_dir.to_path_buf(),
        };

        Logger::type_check_start(self.type_checker.name(), files.len());
        let output = self.type_checker.check(&request).await?;
        let mut diagnostics = output.pre_emit_diagnostics;
        diagnostics.extend(output.emit_diagnostics);
        let diagnostics = sort_and_deduplicate(diagnostics);
        Logger::type_check_complete(self.type_checker.name(), diagnostics.len());

        if !diagnostics.is_empty() {
            let checker = self.type_checker.name().to_string();
            let messages = diagnostics.iter().map(|d| d.format(&checker)).collect();
            return Err(BuilderError::TypeCheck { checker, messages });
        }

        Ok(output.emitted_files)
    }

    fn bundle_request(
        &self,
        options: &CompileOptions,
        entry_points: Vec<PathBuf>,
        format: ModuleFormat,
        source_dir: &Path,
        output_dir: &Path,
        working_directory: PathBuf,
    ) -> BundleRequest {
        let source_map = if options.source_map {
            SourceMapMode::Inline
        } else {
            SourceMapMode::None
        };

        let (bundle, output, plugins, external, metafile, banner): (
            bool,
            OutputTarget,
            Vec<Arc<dyn Plugin>>,
            Vec<String>,
            bool,
            Option<String>,
        ) = match &options.mode {
            BuildMode::PerFile => (
                false,
                OutputTarget::OutDir {
                    dir: output_dir.to_path_buf(),
                    base: source_dir.to_path_buf(),
                    extension: format.extension().to_string(),
                },
                vec![Arc::new(ResolveTypescriptPathsPlugin::new(format))],
                Vec::new(),
                false,
                None,
            ),
            BuildMode::Bundle { output_file, .. } => (
                true,
                OutputTarget::OutFile(output_dir.join(output_file)),
                vec![Arc::new(ExcludeSourceMapsPlugin::default())],
                options.external.clone(),
                true,
                (format == ModuleFormat::Esm).then(|| ESM_COMPATIBILITY_PREAMBLE.to_string()),
            ),
        };

        BundleRequest {
            entry_points,
            bundle,
            minify: options.minify,
            platform: Platform::Node,
            format,
            output,
            source_map,
            plugins,
            external,
            metafile,
            banner,
            working_directory,
        }
    }
}

impl Default for CompileService {
    fn default() -> Self {
        Self::new(
            Arc::new(TokioFileSystemService),
            Arc::new(OxcTypeChecker::new()),
            Arc::new(OxcBundler::new()),
        )
    }
}

/// Compile with the default file system, checker and bundler.
pub async fn compile(options: &CompileOptions) -> Result<CompileResult> {
    CompileService::default().compile(options).await
}
