use super::minifier::{ChunkKind, OxcMinifier};
use super::module_record::{apply_edits, Edit, ImportedName, ModuleRecord, ReExport};
use super::{render_diagnostics, ProcessResult};
use crate::core::models::ModuleFormat;
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    CallExpression, Expression, IdentifierReference, ImportDeclarationSpecifier, ObjectProperty,
    Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_sourcemap::ConcatSourceMapBuilder;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Interop helpers shared by every linked bundle.
const RUNTIME_HELPERS: &str = r#"var __defProp = Object.defineProperty;
var __getOwnPropNames = Object.getOwnPropertyNames;
var __hasOwnProp = Object.prototype.hasOwnProperty;
var __export = (target, all) => {
  for (var name in all) __defProp(target, name, { get: all[name], enumerable: true });
};
var __copyProps = (to, from, except) => {
  if (from && (typeof from === "object" || typeof from === "function")) {
    for (let key of __getOwnPropNames(from))
      if (!__hasOwnProp.call(to, key) && key !== except)
        __defProp(to, key, { get: () => from[key], enumerable: true });
  }
  return to;
};
var __reExport = (target, mod) => __copyProps(target, mod, "default");
var __toESM = (mod) => mod && mod.__esModule ? mod : __copyProps(__defProp({}, "default", { value: mod, enumerable: true }), mod);
var __toCommonJS = (mod) => __copyProps(__defProp({}, "__esModule", { value: true }), mod);
"#;

const SOURCE_MAP_PREFIX: &str = "//# sourceMappingURL=data:application/json;base64,";

/// Where an import specifier of a linked module points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Module(usize),
    /// Left as an import of this path in the output.
    External(String),
}

#[derive(Debug, Clone)]
pub struct LinkModule {
    /// Display name used in chunk comments and source maps.
    pub name: String,
    /// Transpiled JavaScript (or JSON text).
    pub code: String,
    pub format: ModuleFormat,
    pub is_json: bool,
    pub record: ModuleRecord,
    pub targets: HashMap<String, LinkTarget>,
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub format: ModuleFormat,
    pub banner: Option<String>,
    pub minifier: OxcMinifier,
    pub source_map: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LinkedBundle {
    pub code: String,
    /// Printed size of each module's chunk, by module id.
    pub chunk_bytes: HashMap<usize, usize>,
    pub exports: Vec<String>,
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn property_access(object: &str, name: &str) -> String {
    if IDENTIFIER.is_match(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, quote(name))
    }
}

fn property_key(name: &str) -> String {
    if IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Link `modules` into one artifact. `order` lists module ids dependencies
/// first; `entry` is the module whose exports become the bundle's exports.
pub fn link(
    modules: &[LinkModule],
    order: &[usize],
    entry: usize,
    options: &LinkOptions,
) -> ProcessResult<LinkedBundle> {
    Linker::new(modules, options).link(order, entry)
}

struct Linker<'m> {
    modules: &'m [LinkModule],
    options: &'m LinkOptions,
    externals: Vec<String>,
    external_ids: HashMap<String, usize>,
}

impl<'m> Linker<'m> {
    fn new(modules: &'m [LinkModule], options: &'m LinkOptions) -> Self {
        Self {
            modules,
            options,
            externals: Vec::new(),
            external_ids: HashMap::new(),
        }
    }

    fn link(mut self, order: &[usize], entry: usize) -> ProcessResult<LinkedBundle> {
        let mut chunks = Vec::with_capacity(order.len());
        for &id in order {
            let module = self.module(id)?;
            let chunk = match (module.is_json, module.format) {
                (true, _) => self.json_chunk(id, module),
                (false, ModuleFormat::Cjs) => self.cjs_chunk(id, module),
                (false, ModuleFormat::Esm) => self.esm_chunk(id, module)?,
            };
            chunks.push((id, chunk));
        }
        let (footer, exports) = self.footer(entry)?;

        let minifier = self.options.minifier;
        let output_kind = match self.options.format {
            ModuleFormat::Esm => ChunkKind::Module,
            ModuleFormat::Cjs => ChunkKind::Script,
        };

        let mut out = String::new();
        if let Some(banner) = &self.options.banner {
            out.push_str(banner);
            ensure_newline(&mut out);
        }

        let runtime = minifier.print(Path::new("runtime.js"), &self.runtime(order), output_kind, false, false)?;
        out.push_str(&runtime.code);
        ensure_newline(&mut out);

        let mut map_builder = self.options.source_map.then(ConcatSourceMapBuilder::default);
        let mut chunk_bytes = HashMap::new();
        for (id, chunk) in chunks {
            let module = self.module(id)?;
            let kind = match module.format {
                ModuleFormat::Esm if !module.is_json => ChunkKind::Module,
                _ => ChunkKind::Script,
            };
            let printed = minifier.print(Path::new(&module.name), &chunk, kind, true, self.options.source_map)?;
            if !minifier.is_enabled() {
                out.push_str(&format!("// {}\n", module.name));
            }
            if let (Some(builder), Some(map)) = (map_builder.as_mut(), printed.map.as_ref()) {
                let line_offset = out.matches('\n').count() as u32;
                builder.add_sourcemap(map, line_offset);
            }
            chunk_bytes.insert(id, printed.code.len());
            out.push_str(&printed.code);
            ensure_newline(&mut out);
        }

        let footer = minifier.print(Path::new("footer.js"), &footer, output_kind, false, false)?;
        out.push_str(&footer.code);
        ensure_newline(&mut out);

        if let Some(builder) = map_builder {
            let map = builder.into_sourcemap();
            out.push_str(SOURCE_MAP_PREFIX);
            out.push_str(&general_purpose::STANDARD.encode(map.to_json_string()));
            out.push('\n');
        }

        Ok(LinkedBundle {
            code: out,
            chunk_bytes,
            exports,
        })
    }

    fn module(&self, id: usize) -> ProcessResult<&'m LinkModule> {
        self.modules
            .get(id)
            .ok_or_else(|| vec![format!("Unknown module id {}", id)])
    }

    fn target(&self, module: &LinkModule, specifier: &str) -> ProcessResult<LinkTarget> {
        module
            .targets
            .get(specifier)
            .cloned()
            .ok_or_else(|| vec![format!("{}: Could not resolve \"{}\"", module.name, specifier)])
    }

    fn external_id(&mut self, path: &str) -> usize {
        if let Some(&id) = self.external_ids.get(path) {
            return id;
        }
        let id = self.externals.len();
        self.externals.push(path.to_string());
        self.external_ids.insert(path.to_string(), id);
        id
    }

    /// Variable holding the ES namespace of `specifier` as seen from `module`.
    fn namespace_for(&mut self, module: &LinkModule, specifier: &str) -> ProcessResult<String> {
        Ok(match self.target(module, specifier)? {
            LinkTarget::Module(id) => format!("__m{}", id),
            LinkTarget::External(path) => format!("__ext{}", self.external_id(&path)),
        })
    }

    fn runtime(&self, order: &[usize]) -> String {
        let mut runtime = String::new();
        if self.options.format == ModuleFormat::Esm {
            for (id, path) in self.externals.iter().enumerate() {
                runtime.push_str(&format!("import * as __ext{} from {};\n", id, quote(path)));
            }
        }
        runtime.push_str(RUNTIME_HELPERS);
        if self.options.format == ModuleFormat::Cjs {
            for (id, path) in self.externals.iter().enumerate() {
                runtime.push_str(&format!("var __ext{} = __toESM(require({}));\n", id, quote(path)));
            }
        }
        for &id in order {
            match self.modules.get(id) {
                Some(module) if module.format == ModuleFormat::Esm && !module.is_json => {
                    runtime.push_str(&format!("var __m{} = {{}};\n", id))
                }
                Some(_) => runtime.push_str(&format!("var __m{}, __cjs{};\n", id, id)),
                None => {}
            }
        }
        runtime
    }

    fn json_chunk(&self, id: usize, module: &LinkModule) -> String {
        format!(
            "__cjs{id} = {};\n__m{id} = __toESM(__cjs{id});\n",
            module.code.trim(),
            id = id
        )
    }

    fn cjs_chunk(&self, id: usize, module: &LinkModule) -> String {
        let mut edits = Vec::new();
        for call in &module.record.requires {
            if let Some(LinkTarget::Module(target)) = module.targets.get(&call.specifier) {
                let replacement = match self.modules.get(*target) {
                    Some(m) if m.format == ModuleFormat::Esm && !m.is_json => {
                        format!("__toCommonJS(__m{})", target)
                    }
                    _ => format!("__cjs{}", target),
                };
                edits.push(Edit::replace(call.start, call.end, replacement));
            }
        }
        let body = apply_edits(&module.code, edits);

        format!(
            "(() => {{\nvar module = {{ exports: {{}} }};\n(function (exports, module) {{\n{}\n}}).call(module.exports, module.exports, module);\n__cjs{id} = module.exports;\n__m{id} = __toESM(__cjs{id});\n}})();\n",
            body.trim_end(),
            id = id
        )
    }

    fn esm_chunk(&mut self, id: usize, module: &LinkModule) -> ProcessResult<String> {
        let mut accesses = HashMap::new();
        for import in &module.record.imports {
            let namespace = self.namespace_for(module, &import.specifier)?;
            for binding in &import.bindings {
                let access = match &binding.imported {
                    ImportedName::Namespace => namespace.clone(),
                    ImportedName::Named(name) => property_access(&namespace, name),
                };
                accesses.insert(binding.local.clone(), access);
            }
        }

        let mut getters = Vec::new();
        for export in &module.record.local_exports {
            let value = accesses
                .get(&export.local)
                .cloned()
                .unwrap_or_else(|| export.local.clone());
            getters.push(format!("  {}: () => {}", property_key(&export.exported), value));
        }

        let mut stars = Vec::new();
        for re_export in &module.record.re_exports {
            let namespace = self.namespace_for(module, re_export.specifier())?;
            match re_export {
                ReExport::Named { imported, exported, .. } => getters.push(format!(
                    "  {}: () => {}",
                    property_key(exported),
                    property_access(&namespace, imported)
                )),
                ReExport::Namespace { exported, .. } => {
                    getters.push(format!("  {}: () => {}", property_key(exported), namespace))
                }
                ReExport::Star { .. } => stars.push(format!("__reExport(__m{}, {});\n", id, namespace)),
            }
        }

        let mut edits = module.record.edits.clone();
        edits.extend(import_reference_edits(Path::new(&module.name), &module.code, &accesses)?);
        let body = apply_edits(&module.code, edits);

        let mut chunk = String::from("(() => {\n");
        if !getters.is_empty() {
            chunk.push_str(&format!("__export(__m{}, {{\n{}\n}});\n", id, getters.join(",\n")));
        }
        for star in stars {
            chunk.push_str(&star);
        }
        chunk.push_str(body.trim_end());
        chunk.push_str("\n})();\n");
        Ok(chunk)
    }

    fn footer(&self, entry: usize) -> ProcessResult<(String, Vec<String>)> {
        let module = self.module(entry)?;
        let esm_shaped = module.format == ModuleFormat::Esm && !module.is_json;

        match self.options.format {
            ModuleFormat::Cjs => {
                let footer = if esm_shaped {
                    format!("module.exports = __toCommonJS(__m{});\n", entry)
                } else {
                    format!("module.exports = __cjs{};\n", entry)
                };
                Ok((footer, Vec::new()))
            }
            ModuleFormat::Esm if !esm_shaped => Ok((
                format!("export default __cjs{};\n", entry),
                vec!["default".to_string()],
            )),
            ModuleFormat::Esm => {
                let mut star_externals = Vec::new();
                let names = self.static_exports(entry, &mut HashSet::new(), &mut star_externals);

                let mut footer = String::new();
                let mut specifiers = Vec::new();
                for (index, name) in names.iter().enumerate() {
                    footer.push_str(&format!(
                        "var __e{} = {};\n",
                        index,
                        property_access(&format!("__m{}", entry), name)
                    ));
                    specifiers.push(format!("__e{} as {}", index, property_key(name)));
                }
                if !specifiers.is_empty() {
                    footer.push_str(&format!("export {{ {} }};\n", specifiers.join(", ")));
                }
                let mut seen = HashSet::new();
                for path in star_externals {
                    if seen.insert(path.clone()) {
                        footer.push_str(&format!("export * from {};\n", quote(&path)));
                    }
                }
                Ok((footer, names.into_iter().collect()))
            }
        }
    }

    /// Export names of an ES module known without running it. Star exports
    /// of external modules are collected separately.
    fn static_exports(
        &self,
        id: usize,
        visited: &mut HashSet<usize>,
        star_externals: &mut Vec<String>,
    ) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let module = match self.modules.get(id) {
            Some(module) if module.format == ModuleFormat::Esm && !module.is_json => module,
            _ => return names,
        };
        if !visited.insert(id) {
            return names;
        }

        names.extend(module.record.local_exports.iter().map(|e| e.exported.clone()));
        for re_export in &module.record.re_exports {
            match re_export {
                ReExport::Named { exported, .. } | ReExport::Namespace { exported, .. } => {
                    names.insert(exported.clone());
                }
                ReExport::Star { specifier } => match module.targets.get(specifier) {
                    Some(LinkTarget::Module(target)) => {
                        let inner = self.static_exports(*target, visited, star_externals);
                        names.extend(inner.into_iter().filter(|name| name != "default"));
                    }
                    Some(LinkTarget::External(path)) => star_externals.push(path.clone()),
                    None => {}
                },
            }
        }
        names
    }
}

/// Edits replacing every reference to an import binding with its access path.
fn import_reference_edits(
    name: &Path,
    code: &str,
    accesses: &HashMap<String, String>,
) -> ProcessResult<Vec<Edit>> {
    if accesses.is_empty() {
        return Ok(Vec::new());
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        return Err(render_diagnostics(name, code, &ret.errors));
    }
    let program = ret.program;
    let semantic = SemanticBuilder::new().build(&program).semantic;

    let mut symbols = HashMap::new();
    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        for specifier in decl.specifiers.iter().flatten() {
            let local = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
            };
            if let (Some(symbol_id), Some(access)) = (local.symbol_id.get(), accesses.get(local.name.as_str())) {
                symbols.insert(symbol_id, access.clone());
            }
        }
    }

    let mut rewriter = ImportReferenceRewriter {
        scoping: semantic.scoping(),
        symbols,
        edits: Vec::new(),
    };
    rewriter.visit_program(&program);
    Ok(rewriter.edits)
}

struct ImportReferenceRewriter<'s> {
    scoping: &'s Scoping,
    symbols: HashMap<SymbolId, String>,
    edits: Vec<Edit>,
}

impl ImportReferenceRewriter<'_> {
    fn access_for(&self, ident: &IdentifierReference) -> Option<String> {
        let reference_id = ident.reference_id.get()?;
        let symbol_id = self.scoping.get_reference(reference_id).symbol_id()?;
        self.symbols.get(&symbol_id).cloned()
    }
}

impl<'a> Visit<'a> for ImportReferenceRewriter<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(access) = self.access_for(ident) {
            self.edits.push(Edit::replace(ident.span.start, ident.span.end, access));
        }
    }

    fn visit_object_property(&mut self, property: &ObjectProperty<'a>) {
        if property.shorthand {
            if let Expression::Identifier(ident) = &property.value {
                if let Some(access) = self.access_for(ident) {
                    self.edits.push(Edit::replace(
                        property.span.start,
                        property.span.end,
                        format!("{}: {}", ident.name, access),
                    ));
                    return;
                }
            }
        }
        walk::walk_object_property(self, property);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &call.callee {
            if let Some(access) = self.access_for(ident) {
                // Calling through the namespace must not bind `this` to it.
                let callee = if access.contains(['.', '[']) {
                    format!("(0, {})", access)
                } else {
                    access
                };
                self.edits.push(Edit::replace(ident.span.start, ident.span.end, callee));
                for argument in &call.arguments {
                    self.visit_argument(argument);
                }
                return;
            }
        }
        walk::walk_call_expression(self, call);
    }
}
