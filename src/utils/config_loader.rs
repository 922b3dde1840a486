use crate::core::models::CompileConfig;
use crate::utils::{BuilderError, Logger, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "builder.config.json";

/// Loads `builder.config.json`; CLI flags are merged over it by the caller.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Look for the config file in `root`. A missing file is not an error.
    pub fn load_from_file(root: &Path) -> Result<Option<CompileConfig>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Self::load_path(&config_path).map(Some)
    }

    /// Load an explicitly named config file, which must exist.
    pub fn load_path(path: &Path) -> Result<CompileConfig> {
        Logger::debug(&format!("Loading config from {}", path.display()));

        let content = std::fs::read_to_string(path)?;
        let mut config: CompileConfig = serde_json::from_str(&content).map_err(|e| {
            BuilderError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        // Directories in the file are relative to the file, not the caller.
        if let Some(base) = path.parent() {
            config.in_dir = config.in_dir.map(|dir| base.join(dir));
            config.out_dir = config.out_dir.map(|dir| base.join(dir));
            config.working_directory = config.working_directory.map(|dir| base.join(dir));
        }

        Ok(config)
    }

    /// CLI > file > defaults. Defaults are applied later by the `CompileOptions` conversion.
    pub fn merge_with_cli(file_config: Option<CompileConfig>, cli: CompileConfig) -> CompileConfig {
        match file_config {
            Some(file) => cli.or(file),
            None => cli,
        }
    }

    /// Resolve relative directories against `cwd`.
    pub fn resolve_dirs(mut config: CompileConfig, cwd: &Path) -> CompileConfig {
        let resolve = |dir: PathBuf| if dir.is_absolute() { dir } else { cwd.join(dir) };
        config.in_dir = Some(resolve(config.in_dir.unwrap_or_else(|| PathBuf::from("src"))));
        config.out_dir = Some(resolve(config.out_dir.unwrap_or_else(|| PathBuf::from("build"))));
        config
    }
}
