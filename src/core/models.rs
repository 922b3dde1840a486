use crate::utils::{BuilderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What a compile invocation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputIntent {
    #[serde(rename = "module")]
    Module,
    #[serde(rename = "commonjs")]
    CommonJs,
    #[serde(rename = "types")]
    TypesOnly,
}

impl OutputIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputIntent::Module => "module",
            OutputIntent::CommonJs => "commonjs",
            OutputIntent::TypesOnly => "types",
        }
    }

    /// Runtime format of the bundler pass, `None` when only declarations are produced.
    pub fn module_format(&self) -> Option<ModuleFormat> {
        match self {
            OutputIntent::Module => Some(ModuleFormat::Esm),
            OutputIntent::CommonJs => Some(ModuleFormat::Cjs),
            OutputIntent::TypesOnly => None,
        }
    }
}

impl Default for OutputIntent {
    fn default() -> Self {
        OutputIntent::Module
    }
}

impl fmt::Display for OutputIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputIntent {
    type Err = BuilderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "module" => Ok(OutputIntent::Module),
            "commonjs" => Ok(OutputIntent::CommonJs),
            "types" => Ok(OutputIntent::TypesOnly),
            other => Err(BuilderError::config(format!(
                "unknown output type '{}', expected one of module, commonjs, types",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    Esm,
    Cjs,
}

impl ModuleFormat {
    /// File extension (without the dot) used for emitted artifacts.
    pub fn extension(&self) -> &'static str {
        match self {
            ModuleFormat::Esm => "mjs",
            ModuleFormat::Cjs => "cjs",
        }
    }
}

/// Per-file output or one bundled artifact from a single entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMode {
    PerFile,
    Bundle {
        /// Relative to the source directory.
        entry_point: PathBuf,
        /// Relative to the output directory.
        output_file: PathBuf,
    },
}

impl BuildMode {
    /// Enforce that entry point and output file come as a pair.
    pub fn from_parts(entry_point: Option<PathBuf>, output_file: Option<PathBuf>) -> Result<Self> {
        match (entry_point, output_file) {
            (Some(entry_point), Some(output_file)) => Ok(BuildMode::Bundle {
                entry_point,
                output_file,
            }),
            (None, None) => Ok(BuildMode::PerFile),
            (Some(_), None) => Err(BuilderError::config(
                "an entry point was given without an output file",
            )),
            (None, Some(_)) => Err(BuilderError::config(
                "an output file was given without an entry point",
            )),
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, BuildMode::Bundle { .. })
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        BuildMode::PerFile
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub output_intent: OutputIntent,
    pub mode: BuildMode,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Module specifier patterns left as live imports in bundle mode.
    pub external: Vec<String>,
    pub minify: bool,
    pub source_map: bool,
    /// Defaults to the process's current directory.
    pub working_directory: Option<PathBuf>,
}

impl CompileOptions {
    pub fn new(output_intent: OutputIntent, source_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            output_intent,
            mode: BuildMode::PerFile,
            source_dir,
            output_dir,
            external: Vec::new(),
            minify: false,
            source_map: false,
            working_directory: None,
        }
    }

    pub fn with_bundle(mut self, entry_point: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        self.mode = BuildMode::Bundle {
            entry_point: entry_point.into(),
            output_file: output_file.into(),
        };
        self
    }

    pub fn with_external(mut self, external: Vec<String>) -> Self {
        self.external = external;
        self
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_source_map(mut self, source_map: bool) -> Self {
        self.source_map = source_map;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Raw configuration as found in `builder.config.json` or assembled from CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileConfig {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
}

impl CompileConfig {
    /// Fill every unset field of `self` from `other`.
    pub fn or(self, other: CompileConfig) -> CompileConfig {
        CompileConfig {
            output_type: self.output_type.or(other.output_type),
            in_dir: self.in_dir.or(other.in_dir),
            out_dir: self.out_dir.or(other.out_dir),
            entry_point: self.entry_point.or(other.entry_point),
            out_file: self.out_file.or(other.out_file),
            external: self.external.or(other.external),
            minify: self.minify.or(other.minify),
            source_map: self.source_map.or(other.source_map),
            working_directory: self.working_directory.or(other.working_directory),
        }
    }
}

impl TryFrom<CompileConfig> for CompileOptions {
    type Error = BuilderError;

    fn try_from(config: CompileConfig) -> Result<Self> {
        let output_intent = match config.output_type.as_deref() {
            Some(value) => value.parse()?,
            None => OutputIntent::default(),
        };
        let mode = BuildMode::from_parts(config.entry_point, config.out_file)?;

        Ok(CompileOptions {
            output_intent,
            mode,
            source_dir: config.in_dir.unwrap_or_else(|| PathBuf::from("src")),
            output_dir: config.out_dir.unwrap_or_else(|| PathBuf::from("build")),
            external: config.external.unwrap_or_default(),
            minify: config.minify.unwrap_or(false),
            source_map: config.source_map.unwrap_or(false),
            working_directory: config.working_directory,
        })
    }
}

/// An artifact produced in memory. The caller decides whether to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub text: String,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub output_files: Vec<OutputFile>,
    /// Present only in bundle mode.
    pub metafile: Option<Metafile>,
}

/// Dependency metadata in the esbuild metafile shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metafile {
    pub inputs: BTreeMap<String, MetafileInput>,
    pub outputs: BTreeMap<String, MetafileOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileInput {
    pub bytes: usize,
    pub imports: Vec<MetafileImport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ModuleFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileImport {
    pub path: String,
    pub kind: ImportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileOutput {
    pub bytes: usize,
    pub inputs: BTreeMap<String, MetafileOutputInput>,
    pub imports: Vec<MetafileImport>,
    pub exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileOutputInput {
    pub bytes_in_output: usize,
}

/// How a module was reached, as reported to resolve hooks and in the metafile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    EntryPoint,
    ImportStatement,
    RequireCall,
    DynamicImport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_mode_pairing() {
        assert_eq!(BuildMode::from_parts(None, None).unwrap(), BuildMode::PerFile);
        assert!(BuildMode::from_parts(Some("index.ts".into()), Some("index.mjs".into()))
            .unwrap()
            .is_bundle());
        assert!(matches!(
            BuildMode::from_parts(Some("index.ts".into()), None),
            Err(BuilderError::Config(_))
        ));
        assert!(matches!(
            BuildMode::from_parts(None, Some("index.mjs".into())),
            Err(BuilderError::Config(_))
        ));
    }

    #[test]
    fn test_config_conversion_defaults() {
        let options = CompileOptions::try_from(CompileConfig::default()).unwrap();
        assert_eq!(options.output_intent, OutputIntent::Module);
        assert_eq!(options.mode, BuildMode::PerFile);
        assert_eq!(options.source_dir, PathBuf::from("src"));
        assert_eq!(options.output_dir, PathBuf::from("build"));
        assert!(options.external.is_empty());
        assert!(!options.minify);
        assert!(!options.source_map);
    }

    #[test]
    fn test_config_conversion_rejects_unknown_type() {
        let config = CompileConfig {
            output_type: Some("amd".to_string()),
            ..Default::default()
        };
        let err = CompileOptions::try_from(config).unwrap_err();
        assert!(err.to_string().contains("unknown output type 'amd'"));
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: CompileConfig = serde_json::from_str(
            r#"{"type":"commonjs","entryPoint":"index.ts","outFile":"index.cjs","external":["*"],"sourceMap":true}"#,
        )
        .unwrap();
        let options = CompileOptions::try_from(config).unwrap();
        assert_eq!(options.output_intent, OutputIntent::CommonJs);
        assert_eq!(
            options.mode,
            BuildMode::Bundle {
                entry_point: "index.ts".into(),
                output_file: "index.cjs".into(),
            }
        );
        assert_eq!(options.external, vec!["*".to_string()]);
        assert!(options.source_map);
    }

    #[test]
    fn test_config_or_prefers_self() {
        let cli = CompileConfig {
            minify: Some(true),
            ..Default::default()
        };
        let file = CompileConfig {
            minify: Some(false),
            out_dir: Some("dist".into()),
            ..Default::default()
        };
        let merged = cli.or(file);
        assert_eq!(merged.minify, Some(true));
        assert_eq!(merged.out_dir, Some(PathBuf::from("dist")));
    }

    #[test]
    fn test_metafile_serializes_esbuild_shape() {
        let mut metafile = Metafile::default();
        metafile.inputs.insert(
            "src/index.ts".to_string(),
            MetafileInput {
                bytes: 10,
                imports: vec![MetafileImport {
                    path: "node:util".to_string(),
                    kind: ImportKind::ImportStatement,
                    external: Some(true),
                    original: None,
                }],
                format: Some(ModuleFormat::Esm),
            },
        );
        let json = serde_json::to_value(&metafile).unwrap();
        assert_eq!(json["inputs"]["src/index.ts"]["imports"][0]["kind"], "import-statement");
        assert_eq!(json["inputs"]["src/index.ts"]["format"], "esm");
    }
}
