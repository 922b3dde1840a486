use crate::core::interfaces::FileSystemService;
use crate::core::models::*;
use crate::core::services::compile;
use crate::infrastructure::TokioFileSystemService;
use crate::utils::{BundleAnalysis, ConfigLoader, Logger, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

pub const METAFILE_NAME: &str = "metafile.json";

#[derive(Parser, Debug, Default)]
#[command(name = "builder")]
#[command(about = "Type-check and bundle TypeScript into ESM, CommonJS or declarations")]
pub struct Cli {
    /// Output type: module, commonjs or types
    #[arg(short = 't', long = "type")]
    pub output_type: Option<String>,
    /// Source directory (default: src)
    #[arg(short = 'i', long = "inDir")]
    pub in_dir: Option<PathBuf>,
    /// Output directory (default: build)
    #[arg(short = 'o', long = "outDir")]
    pub out_dir: Option<PathBuf>,
    /// Bundle entry point, relative to the source directory
    #[arg(short = 'e', long = "entryPoint")]
    pub entry_point: Option<PathBuf>,
    /// Bundle output file, relative to the output directory
    #[arg(short = 'f', long = "outFile")]
    pub out_file: Option<PathBuf>,
    /// Module specifier pattern to keep as a live import (repeatable)
    #[arg(short = 'x', long = "external")]
    pub external: Vec<String>,
    /// Minify output
    #[arg(short = 'm', long = "minify")]
    pub minify: bool,
    /// Emit inline source maps
    #[arg(short = 's', long = "sourceMap")]
    pub source_map: bool,
    /// JSON config file (default: builder.config.json when present)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Flags as a partial config. Unset flags stay `None` so file values can fill them.
    pub fn to_config(&self) -> CompileConfig {
        CompileConfig {
            output_type: self.output_type.clone(),
            in_dir: self.in_dir.clone(),
            out_dir: self.out_dir.clone(),
            entry_point: self.entry_point.clone(),
            out_file: self.out_file.clone(),
            external: (!self.external.is_empty()).then(|| self.external.clone()),
            minify: self.minify.then_some(true),
            source_map: self.source_map.then_some(true),
            working_directory: None,
        }
    }
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        Logger::init();

        let cli = Cli::parse();
        let cwd = std::env::current_dir()?;
        self.execute(&cli, &cwd).await
    }

    /// Compile with `cwd` standing in for the process's current directory, then
    /// write every artifact.
    pub async fn execute(&self, cli: &Cli, cwd: &Path) -> Result<()> {
        let file_config = match &cli.config {
            Some(path) => Some(ConfigLoader::load_path(&cwd.join(path))?),
            None => ConfigLoader::load_from_file(cwd)?,
        };
        let config = ConfigLoader::merge_with_cli(file_config, cli.to_config());
        let mut config = ConfigLoader::resolve_dirs(config, cwd);
        if config.working_directory.is_none() {
            config.working_directory = Some(cwd.to_path_buf());
        }
        let options = CompileOptions::try_from(config)?;

        let result = compile(&options).await?;

        let fs_service = TokioFileSystemService;
        for file in &result.output_files {
            fs_service.write_file(&file.path, &file.text).await?;
            Logger::wrote_file(&file.path.display().to_string(), file.text.len());
        }

        if let Some(metafile) = &result.metafile {
            let metafile_path = options.output_dir.join(METAFILE_NAME);
            let json = serde_json::to_string_pretty(metafile)?;
            fs_service.write_file(&metafile_path, &json).await?;

            let summary = summary_line(&options, metafile, &metafile_path);
            println!("{}", summary);
            Logger::debug(&summary);
        }

        Logger::info(&format!("✅ Wrote {} files", result.output_files.len()));
        Ok(())
    }
}

/// The analyzer line printed to stdout once a metafile has been written.
pub fn summary_line(options: &CompileOptions, metafile: &Metafile, metafile_path: &Path) -> String {
    let out_file = match &options.mode {
        BuildMode::Bundle { output_file, .. } => output_file.display().to_string(),
        BuildMode::PerFile => metafile_path.display().to_string(),
    };
    BundleAnalysis::analyze(metafile).summary(&out_file)
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
