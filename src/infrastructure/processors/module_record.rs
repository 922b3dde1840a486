use crate::core::models::ImportKind;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, BindingPatternKind, CallExpression, Declaration, ExportDefaultDeclarationKind,
    Expression, ImportDeclarationSpecifier, ModuleExportName, Program, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

/// Name bound by the synthesized declaration of an anonymous default export.
pub const DEFAULT_EXPORT_LOCAL: &str = "__default";

/// Replace `source[start..end]` with `text`. Zero-width edits insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: u32,
    pub end: u32,
    pub text: String,
}

impl Edit {
    pub fn remove(start: u32, end: u32) -> Self {
        Self::replace(start, end, "")
    }

    pub fn replace(start: u32, end: u32, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn insert(at: u32, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }
}

/// Apply non-overlapping edits; an edit starting inside an earlier one is dropped.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for edit in edits {
        let (start, end) = (edit.start as usize, edit.end as usize);
        if start < cursor || end > source.len() {
            continue;
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&edit.text);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedName {
    Named(String),
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub imported: ImportedName,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticImport {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReExport {
    Named {
        specifier: String,
        imported: String,
        exported: String,
    },
    Namespace {
        specifier: String,
        exported: String,
    },
    Star {
        specifier: String,
    },
}

impl ReExport {
    pub fn specifier(&self) -> &str {
        match self {
            ReExport::Named { specifier, .. }
            | ReExport::Namespace { specifier, .. }
            | ReExport::Star { specifier } => specifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExport {
    pub exported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    pub specifier: String,
    pub start: u32,
    pub end: u32,
}

/// Module syntax of one JavaScript module, with the edits that strip it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRecord {
    pub imports: Vec<StaticImport>,
    pub re_exports: Vec<ReExport>,
    pub local_exports: Vec<LocalExport>,
    pub requires: Vec<RequireCall>,
    pub edits: Vec<Edit>,
    /// Import and export statements in source order, by specifier.
    order: Vec<(String, ImportKind)>,
}

impl ModuleRecord {
    pub fn has_module_syntax(&self) -> bool {
        !self.imports.is_empty() || !self.re_exports.is_empty() || !self.local_exports.is_empty()
            || self.edits.iter().any(|e| e.start != e.end)
    }

    /// Distinct specifiers in the order the module first mentions them.
    pub fn specifiers(&self) -> Vec<(String, ImportKind)> {
        let mut seen = std::collections::HashSet::new();
        self.order
            .iter()
            .filter(|(specifier, _)| seen.insert(specifier.clone()))
            .cloned()
            .collect()
    }
}

/// Parse `code` as an ES module and record its imports and exports.
pub fn analyze_esm(code: &str) -> Result<ModuleRecord, Vec<String>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        return Err(ret.errors.iter().map(|e| e.to_string()).collect());
    }
    Ok(collect_module_syntax(&ret.program, code))
}

/// Parse `code` as a CommonJS script and record its `require("…")` calls.
pub fn analyze_cjs(code: &str) -> Result<ModuleRecord, Vec<String>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs().with_module(false)).parse();
    if !ret.errors.is_empty() {
        return Err(ret.errors.iter().map(|e| e.to_string()).collect());
    }
    let mut collector = RequireCollector::default();
    collector.visit_program(&ret.program);

    let mut record = ModuleRecord::default();
    for call in collector.calls {
        record.order.push((call.specifier.clone(), ImportKind::RequireCall));
        record.requires.push(call);
    }
    Ok(record)
}

/// Whether `code` parses as a classic script (no import/export syntax).
pub fn parses_as_script(code: &str) -> bool {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs().with_module(false)).parse();
    ret.errors.is_empty()
}

pub fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn collect_module_syntax(program: &Program, code: &str) -> ModuleRecord {
    let mut record = ModuleRecord::default();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                let specifier = decl.source.value.to_string();
                let mut bindings = Vec::new();
                if let Some(specifiers) = &decl.specifiers {
                    for spec in specifiers {
                        let binding = match spec {
                            ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding {
                                imported: ImportedName::Named(export_name(&s.imported)),
                                local: s.local.name.to_string(),
                            },
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ImportBinding {
                                imported: ImportedName::Named("default".to_string()),
                                local: s.local.name.to_string(),
                            },
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ImportBinding {
                                imported: ImportedName::Namespace,
                                local: s.local.name.to_string(),
                            },
                        };
                        bindings.push(binding);
                    }
                }
                record.order.push((specifier.clone(), ImportKind::ImportStatement));
                record.imports.push(StaticImport { specifier, bindings });
                record.edits.push(Edit::remove(decl.span.start, decl.span.end));
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source {
                    let specifier = source.value.to_string();
                    for spec in &decl.specifiers {
                        record.re_exports.push(ReExport::Named {
                            specifier: specifier.clone(),
                            imported: export_name(&spec.local),
                            exported: export_name(&spec.exported),
                        });
                    }
                    record.order.push((specifier, ImportKind::ImportStatement));
                    record.edits.push(Edit::remove(decl.span.start, decl.span.end));
                } else if let Some(declaration) = &decl.declaration {
                    for name in declaration_names(declaration) {
                        record.local_exports.push(LocalExport {
                            exported: name.clone(),
                            local: name,
                        });
                    }
                    record
                        .edits
                        .push(Edit::remove(decl.span.start, declaration.span().start));
                } else {
                    for spec in &decl.specifiers {
                        record.local_exports.push(LocalExport {
                            exported: export_name(&spec.exported),
                            local: export_name(&spec.local),
                        });
                    }
                    record.edits.push(Edit::remove(decl.span.start, decl.span.end));
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let (local, inner_start, inner_end) = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => (
                        f.id.as_ref().map(|id| id.name.to_string()),
                        f.span.start,
                        f.span.end,
                    ),
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => (
                        c.id.as_ref().map(|id| id.name.to_string()),
                        c.span.start,
                        c.span.end,
                    ),
                    other => match other.as_expression() {
                        Some(expr) => (None, expr.span().start, expr.span().end),
                        None => continue,
                    },
                };

                match local {
                    Some(name) => {
                        record.edits.push(Edit::remove(decl.span.start, inner_start));
                        record.local_exports.push(LocalExport {
                            exported: "default".to_string(),
                            local: name,
                        });
                    }
                    None => {
                        record.edits.push(Edit::replace(
                            decl.span.start,
                            inner_start,
                            format!("var {} = ", DEFAULT_EXPORT_LOCAL),
                        ));
                        let terminated = code
                            .get(inner_end as usize..decl.span.end as usize)
                            .map(|rest| rest.contains(';'))
                            .unwrap_or(false);
                        if !terminated {
                            record.edits.push(Edit::insert(inner_end, ";"));
                        }
                        record.local_exports.push(LocalExport {
                            exported: "default".to_string(),
                            local: DEFAULT_EXPORT_LOCAL.to_string(),
                        });
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                let specifier = decl.source.value.to_string();
                let re_export = match &decl.exported {
                    Some(exported) => ReExport::Namespace {
                        specifier: specifier.clone(),
                        exported: export_name(exported),
                    },
                    None => ReExport::Star {
                        specifier: specifier.clone(),
                    },
                };
                record.re_exports.push(re_export);
                record.order.push((specifier, ImportKind::ImportStatement));
                record.edits.push(Edit::remove(decl.span.start, decl.span.end));
            }
            _ => {}
        }
    }

    record
}

/// Names bound by an exported declaration.
pub fn declaration_names(declaration: &Declaration) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                binding_names(&declarator.id.kind, &mut names);
            }
        }
        Declaration::FunctionDeclaration(f) => names.extend(f.id.as_ref().map(|id| id.name.to_string())),
        Declaration::ClassDeclaration(c) => names.extend(c.id.as_ref().map(|id| id.name.to_string())),
        _ => {}
    }
    names
}

pub fn binding_names(kind: &BindingPatternKind, names: &mut Vec<String>) {
    match kind {
        BindingPatternKind::BindingIdentifier(ident) => names.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(pattern) => {
            for property in &pattern.properties {
                binding_names(&property.value.kind, names);
            }
            if let Some(rest) = &pattern.rest {
                binding_names(&rest.argument.kind, names);
            }
        }
        BindingPatternKind::ArrayPattern(pattern) => {
            for element in pattern.elements.iter().flatten() {
                binding_names(&element.kind, names);
            }
            if let Some(rest) = &pattern.rest {
                binding_names(&rest.argument.kind, names);
            }
        }
        BindingPatternKind::AssignmentPattern(pattern) => binding_names(&pattern.left.kind, names),
    }
}

#[derive(Default)]
struct RequireCollector {
    calls: Vec<RequireCall>,
}

impl<'a> Visit<'a> for RequireCollector {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            if callee.name == "require" && call.arguments.len() == 1 {
                if let Argument::StringLiteral(lit) = &call.arguments[0] {
                    self.calls.push(RequireCall {
                        specifier: lit.value.to_string(),
                        start: call.span.start,
                        end: call.span.end,
                    });
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}
