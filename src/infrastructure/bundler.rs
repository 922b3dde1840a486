use crate::core::interfaces::{BundleOutput, BundleRequest, Bundler, OutputTarget, SourceMapMode};
use crate::core::models::{
    ImportKind, Metafile, MetafileImport, MetafileInput, MetafileOutput, MetafileOutputInput,
    ModuleFormat, OutputFile,
};
use crate::core::plugin::{LoadArgs, Loader, PluginManager, ResolveArgs};
use crate::infrastructure::node_resolver::{
    normalize_path, parse_package_specifier, NodeModuleResolver, BUNDLE_EXTENSIONS,
};
use crate::infrastructure::processors::{
    analyze_cjs, analyze_esm, detect_format, emit_module, link, transpile, LinkModule,
    LinkOptions, LinkTarget, ModuleRecord, OxcMinifier, ProcessResult, ReExport,
};
use crate::utils::paths::{mirror_path, relative_path, to_slash};
use crate::utils::{Logger, Result, Timer};
use base64::{engine::general_purpose, Engine as _};
use futures::future::join_all;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

const SOURCE_MAPPING_URL: &str = "//# sourceMappingURL=";

/// Matches `--external` patterns, where `*` stands for any run of characters.
#[derive(Debug, Clone, Default)]
pub struct ExternalMatcher {
    patterns: Vec<Regex>,
}

impl ExternalMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
                Regex::new(&format!("^{}$", body))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// A bare specifier matches when it, or the package it names, matches a pattern.
    pub fn matches(&self, specifier: &str) -> bool {
        let (package, _) = parse_package_specifier(specifier);
        self.patterns
            .iter()
            .any(|pattern| pattern.is_match(specifier) || pattern.is_match(&package))
    }
}

enum Resolution {
    External(String),
    Module(PathBuf),
}

struct GraphModule {
    path: PathBuf,
    key: String,
    bytes: usize,
    loader: Loader,
    source: String,
    format: ModuleFormat,
    code: String,
    record: ModuleRecord,
    targets: HashMap<String, LinkTarget>,
    imports: Vec<MetafileImport>,
    deps: Vec<usize>,
}

struct Analyzed {
    format: ModuleFormat,
    code: String,
    record: ModuleRecord,
    warning: Option<String>,
}

/// One entry point's contribution to the bundle output.
struct EntryBuild {
    file: OutputFile,
    inputs: Vec<(String, MetafileInput)>,
    output: MetafileOutput,
    warnings: Vec<String>,
}

/// Module graph rooted at one entry point
struct GraphBuilder<'r> {
    request: &'r BundleRequest,
    plugins: &'r PluginManager,
    external: &'r ExternalMatcher,
    resolver: NodeModuleResolver,
    ids: HashMap<PathBuf, usize>,
    pending: VecDeque<(usize, PathBuf)>,
    modules: Vec<Option<GraphModule>>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl<'r> GraphBuilder<'r> {
    fn new(request: &'r BundleRequest, plugins: &'r PluginManager, external: &'r ExternalMatcher) -> Self {
        Self {
            request,
            plugins,
            external,
            resolver: NodeModuleResolver::new(),
            ids: HashMap::new(),
            pending: VecDeque::new(),
            modules: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn key(&self, path: &Path) -> String {
        to_slash(&relative_path(&self.request.working_directory, path))
    }

    fn register(&mut self, path: PathBuf) -> usize {
        if let Some(&id) = self.ids.get(&path) {
            return id;
        }
        let id = self.modules.len();
        self.modules.push(None);
        self.ids.insert(path.clone(), id);
        self.pending.push_back((id, path));
        id
    }

    async fn build(mut self, entry: &Path) -> std::result::Result<(Vec<GraphModule>, Vec<String>), Vec<String>> {
        let entry_path = match self.resolve_entry(entry).await {
            Ok(path) => path,
            Err(error) => return Err(vec![error]),
        };
        self.register(entry_path);

        while let Some((id, path)) = self.pending.pop_front() {
            match self.load_module(&path).await {
                Ok(module) => self.modules[id] = Some(module),
                Err(errors) => self.errors.extend(errors),
            }
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        let modules: Option<Vec<GraphModule>> = self.modules.into_iter().collect();
        modules
            .map(|modules| (modules, self.warnings))
            .ok_or_else(|| vec![format!("{}: module graph is incomplete", entry.display())])
    }

    async fn resolve_entry(&mut self, entry: &Path) -> std::result::Result<PathBuf, String> {
        let args = ResolveArgs {
            path: entry.to_string_lossy().into_owned(),
            importer: None,
            resolve_dir: self.request.working_directory.clone(),
            kind: ImportKind::EntryPoint,
        };
        match self.plugins.resolve(&args).await {
            Ok(Some(result)) if result.external => {
                Err(format!("The entry point \"{}\" cannot be marked as external", entry.display()))
            }
            Ok(Some(result)) => Ok(normalize_path(&self.request.working_directory.join(result.path))),
            Ok(None) => Ok(normalize_path(&self.request.working_directory.join(entry))),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn load_module(&mut self, path: &Path) -> ProcessResult<GraphModule> {
        let key = self.key(path);
        Logger::processing_module(&key);

        let loaded = self
            .plugins
            .load(&LoadArgs { path: path.to_path_buf() })
            .await
            .map_err(|e| vec![format!("{}: {}", key, e)])?;
        let (source, loader) = match loaded {
            Some(result) => {
                let loader = result.loader.or_else(|| Loader::from_path(path));
                (result.contents, loader)
            }
            None => {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| vec![format!("Could not read \"{}\": {}", key, e)])?;
                (contents, Loader::from_path(path))
            }
        };
        let loader = loader.ok_or_else(|| {
            vec![format!("No loader is configured for \"{}\"", key)]
        })?;

        let analyzed = {
            let path = path.to_path_buf();
            let source = source.clone();
            tokio::task::spawn_blocking(move || analyze(&path, &source, loader))
                .await
                .map_err(|e| vec![format!("{}: {}", key, e)])??
        };
        self.warnings.extend(analyzed.warning);

        let mut module = GraphModule {
            path: path.to_path_buf(),
            key,
            bytes: source.len(),
            loader,
            source,
            format: analyzed.format,
            code: analyzed.code,
            record: analyzed.record,
            targets: HashMap::new(),
            imports: Vec::new(),
            deps: Vec::new(),
        };

        let importer_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut errors = Vec::new();
        for (specifier, kind) in module.record.specifiers() {
            match self.resolve(&specifier, kind, path, &importer_dir).await {
                Ok(Resolution::External(target)) => {
                    module.imports.push(MetafileImport {
                        path: target.clone(),
                        kind,
                        external: Some(true),
                        original: (target != specifier).then(|| specifier.clone()),
                    });
                    module.targets.insert(specifier, LinkTarget::External(target));
                }
                Ok(Resolution::Module(target)) => {
                    let target = normalize_path(&target);
                    let target_key = self.key(&target);
                    let id = self.register(target);
                    module.imports.push(MetafileImport {
                        path: target_key,
                        kind,
                        external: None,
                        original: Some(specifier.clone()),
                    });
                    module.targets.insert(specifier, LinkTarget::Module(id));
                    if !module.deps.contains(&id) {
                        module.deps.push(id);
                    }
                }
                Err(error) => errors.push(format!("{}: {}", module.key, error)),
            }
        }

        if errors.is_empty() {
            Ok(module)
        } else {
            Err(errors)
        }
    }

    async fn resolve(
        &mut self,
        specifier: &str,
        kind: ImportKind,
        importer: &Path,
        importer_dir: &Path,
    ) -> std::result::Result<Resolution, String> {
        let args = ResolveArgs {
            path: specifier.to_string(),
            importer: Some(importer.to_path_buf()),
            resolve_dir: importer_dir.to_path_buf(),
            kind,
        };
        match self.plugins.resolve(&args).await {
            Ok(Some(result)) if result.external => return Ok(Resolution::External(result.path)),
            Ok(Some(result)) => return Ok(Resolution::Module(importer_dir.join(result.path))),
            Ok(None) => {}
            Err(e) => return Err(e.to_string()),
        }

        if !self.request.bundle || NodeModuleResolver::is_builtin(specifier) {
            return Ok(Resolution::External(specifier.to_string()));
        }

        let relative = NodeModuleResolver::is_relative(specifier);
        if !relative && self.external.matches(specifier) {
            return Ok(Resolution::External(specifier.to_string()));
        }

        let resolved = if relative {
            self.resolver
                .resolve_relative(specifier, importer_dir, &BUNDLE_EXTENSIONS)
                .await
        } else {
            self.resolver.resolve_package(specifier, importer_dir, kind).await
        };
        resolved
            .map(Resolution::Module)
            .ok_or_else(|| format!("Could not resolve \"{}\"", specifier))
    }
}

fn analyze(path: &Path, source: &str, loader: Loader) -> ProcessResult<Analyzed> {
    let format = detect_format(path, source, loader);
    let code = transpile(path, source, loader)?;
    let prefix = |errors: Vec<String>| -> Vec<String> {
        errors
            .into_iter()
            .map(|e| format!("{}: {}", path.display(), e))
            .collect()
    };
    let record = match (loader, format) {
        (Loader::Json, _) => ModuleRecord::default(),
        (_, ModuleFormat::Esm) => analyze_esm(&code).map_err(prefix)?,
        (_, ModuleFormat::Cjs) => analyze_cjs(&code).map_err(prefix)?,
    };
    let warning = match loader {
        Loader::Js => source_map_warning(path, source),
        _ => None,
    };
    Ok(Analyzed {
        format,
        code,
        record,
        warning,
    })
}

/// Check the last source map comment of a JavaScript file the way a
/// downstream consumer would read it.
fn source_map_warning(path: &Path, source: &str) -> Option<String> {
    let start = source.rfind(SOURCE_MAPPING_URL)? + SOURCE_MAPPING_URL.len();
    let url = source[start..].lines().next().unwrap_or_default().trim();

    if let Some(data) = url.strip_prefix("data:") {
        let valid = data
            .split_once(";base64,")
            .and_then(|(_, encoded)| general_purpose::STANDARD.decode(encoded).ok())
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
            .is_some();
        return (!valid).then(|| format!("{}: Invalid source map comment", path.display()));
    }

    let map_path = path.parent()?.join(url);
    (!map_path.is_file()).then(|| {
        format!(
            "{}: Cannot read source map \"{}\": file not found",
            path.display(),
            map_path.display()
        )
    })
}

/// Export names of a module that is emitted unchanged.
fn direct_exports(record: &ModuleRecord) -> Vec<String> {
    let mut names: Vec<String> = record.local_exports.iter().map(|e| e.exported.clone()).collect();
    for re_export in &record.re_exports {
        match re_export {
            ReExport::Named { exported, .. } | ReExport::Namespace { exported, .. } => {
                names.push(exported.clone())
            }
            ReExport::Star { .. } => {}
        }
    }
    names.sort();
    names.dedup();
    names
}

fn post_order(modules: &[GraphModule], entry: usize) -> Vec<usize> {
    fn visit(modules: &[GraphModule], id: usize, seen: &mut HashSet<usize>, order: &mut Vec<usize>) {
        if !seen.insert(id) {
            return;
        }
        for &dep in &modules[id].deps {
            visit(modules, dep, seen, order);
        }
        order.push(id);
    }

    let mut order = Vec::with_capacity(modules.len());
    visit(modules, entry, &mut HashSet::new(), &mut order);
    order
}

/// oxc-backed bundler: resolves, loads and links a module graph per entry point
#[derive(Debug, Clone, Default)]
pub struct OxcBundler;

impl OxcBundler {
    pub fn new() -> Self {
        Self
    }

    async fn build_entry(
        &self,
        entry: &Path,
        request: &BundleRequest,
        plugins: &PluginManager,
        external: &ExternalMatcher,
    ) -> std::result::Result<EntryBuild, Vec<String>> {
        let (modules, warnings) = GraphBuilder::new(request, plugins, external).build(entry).await?;
        let entry_module = &modules[0];

        let out_path = match &request.output {
            OutputTarget::OutFile(path) => request.working_directory.join(path),
            OutputTarget::OutDir { dir, base, extension } => {
                mirror_path(&entry_module.path, &request.working_directory.join(base), &request.working_directory.join(dir), extension)
            }
        };
        let out_dir = out_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let minifier = OxcMinifier::new(request.minify);
        let source_map = request.source_map == SourceMapMode::Inline;

        let passthrough = modules.len() == 1
            && entry_module.format == ModuleFormat::Esm
            && entry_module.loader != Loader::Json
            && request.format == ModuleFormat::Esm;

        let (text, chunk_bytes, exports) = if passthrough {
            let rewrites: HashMap<String, String> = entry_module
                .targets
                .iter()
                .filter_map(|(specifier, target)| match target {
                    LinkTarget::External(path) => Some((specifier.clone(), path.clone())),
                    LinkTarget::Module(_) => None,
                })
                .collect();
            let map_path = PathBuf::from(to_slash(&relative_path(&out_dir, &entry_module.path)));
            let path = entry_module.path.clone();
            let source = entry_module.source.clone();
            let loader = entry_module.loader;
            let emitted = tokio::task::spawn_blocking(move || {
                emit_module(&path, &source, loader, &rewrites, minifier, source_map.then_some(map_path.as_path()))
            })
            .await
            .map_err(|e| vec![e.to_string()])??;

            let mut text = String::new();
            if let Some(banner) = &request.banner {
                text.push_str(banner);
                text.push('\n');
            }
            text.push_str(&emitted.code);
            if let Some(map) = emitted.map {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(SOURCE_MAPPING_URL);
                text.push_str("data:application/json;base64,");
                text.push_str(&general_purpose::STANDARD.encode(map.to_json_string()));
                text.push('\n');
            }
            let chunk_bytes = HashMap::from([(0, emitted.code.len())]);
            (text, chunk_bytes, direct_exports(&entry_module.record))
        } else {
            let order = post_order(&modules, 0);
            let link_modules: Vec<LinkModule> = modules
                .iter()
                .map(|module| LinkModule {
                    name: module.key.clone(),
                    code: module.code.clone(),
                    format: module.format,
                    is_json: module.loader == Loader::Json,
                    record: module.record.clone(),
                    targets: module.targets.clone(),
                })
                .collect();
            let options = LinkOptions {
                format: request.format,
                banner: request.banner.clone(),
                minifier,
                source_map,
            };
            let linked = tokio::task::spawn_blocking(move || link(&link_modules, &order, 0, &options))
                .await
                .map_err(|e| vec![e.to_string()])??;
            (linked.code, linked.chunk_bytes, linked.exports)
        };

        let inputs = modules
            .iter()
            .map(|module| {
                (
                    module.key.clone(),
                    MetafileInput {
                        bytes: module.bytes,
                        imports: module.imports.clone(),
                        format: (module.loader != Loader::Json).then_some(module.format),
                    },
                )
            })
            .collect();

        let mut output_imports: Vec<MetafileImport> = Vec::new();
        for import in modules.iter().flat_map(|m| m.imports.iter()) {
            if import.external == Some(true) && !output_imports.iter().any(|i| i.path == import.path) {
                output_imports.push(MetafileImport {
                    path: import.path.clone(),
                    kind: import.kind,
                    external: Some(true),
                    original: None,
                });
            }
        }

        let output = MetafileOutput {
            bytes: text.len(),
            inputs: modules
                .iter()
                .enumerate()
                .map(|(id, module)| {
                    let bytes_in_output = chunk_bytes.get(&id).copied().unwrap_or_default();
                    (module.key.clone(), MetafileOutputInput { bytes_in_output })
                })
                .collect::<BTreeMap<_, _>>(),
            imports: output_imports,
            exports,
            entry_point: Some(entry_module.key.clone()),
        };

        Ok(EntryBuild {
            file: OutputFile::new(out_path, text),
            inputs,
            output,
            warnings,
        })
    }
}

#[async_trait::async_trait]
impl Bundler for OxcBundler {
    fn name(&self) -> &str {
        "bundle"
    }

    async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput> {
        let _timer = Timer::start("Bundle");
        Logger::bundle_start(self.name(), request.entry_points.len(), request.bundle);

        let plugins = PluginManager::from_plugins(request.plugins.clone());
        let external = ExternalMatcher::new(&request.external)?;

        let builds = join_all(
            request
                .entry_points
                .iter()
                .map(|entry| self.build_entry(entry, &request, &plugins, &external)),
        )
        .await;

        let mut output = BundleOutput::default();
        let mut metafile = Metafile::default();
        for build in builds {
            match build {
                Ok(build) => {
                    output.warnings.extend(build.warnings);
                    metafile.inputs.extend(build.inputs);
                    let key = to_slash(&relative_path(&request.working_directory, &build.file.path));
                    metafile.outputs.insert(key, build.output);
                    output.output_files.push(build.file);
                }
                Err(errors) => output.errors.extend(errors),
            }
        }

        if !output.errors.is_empty() {
            output.output_files.clear();
        }
        if request.metafile {
            output.metafile = Some(metafile);
        }

        Logger::bundle_complete(self.name(), output.output_files.len());
        Ok(output)
    }
}
