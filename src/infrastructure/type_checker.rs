use crate::core::compiler_options::{CompilerOptions, EmitMode};
use crate::core::diagnostics::{Diagnostic, DiagnosticLocation};
use crate::core::interfaces::{TypeCheckOutput, TypeCheckRequest, TypeChecker};
use crate::core::models::OutputFile;
use crate::infrastructure::node_resolver::{normalize_path, NodeModuleResolver, TYPESCRIPT_EXTENSIONS};
use crate::infrastructure::processors::module_record::binding_names;
use crate::utils::{Logger, Result, Timer};
use futures::future::join_all;
use once_cell::sync::Lazy;
use oxc_allocator::{Allocator, Vec as ArenaVec};
use oxc_ast::ast::{
    ArrowFunctionExpression, BindingPatternKind, BreakStatement, Class, ClassElement,
    DoWhileStatement, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
    ExportNamedDeclaration, Expression, ForInStatement, ForOfStatement, ForStatement,
    FormalParameters, Function, FunctionBody, IdentifierReference, ImportDeclaration,
    ImportDeclarationSpecifier, MethodDefinitionKind, Program, ReturnStatement, Statement,
    SwitchStatement, TSType, TSTypeAnnotation, TSTypeName, VariableDeclaration,
    VariableDeclarationKind, WhileStatement,
};
use oxc_ast::AstKind;
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::Codegen;
use oxc_diagnostics::OxcDiagnostic;
use oxc_isolated_declarations::{IsolatedDeclarations, IsolatedDeclarationsOptions};
use oxc_parser::Parser;
use oxc_semantic::{ScopeFlags, Scoping, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const UNEXPECTED_TOKEN: u32 = 1434;
const CANNOT_FIND_MODULE: u32 = 2307;
const CANNOT_FIND_NAME: u32 = 2304;
const MISSING_OVERRIDE: u32 = 4114;
const MISSING_ABSTRACT_OVERRIDE: u32 = 4116;
const UNUSED_DECLARATION: u32 = 6133;
const FILE_NOT_FOUND: u32 = 6053;
const UNREACHABLE_CODE: u32 = 7027;
const UNUSED_LABEL: u32 = 7028;
const NOT_ALL_PATHS_RETURN: u32 = 7030;

/// oxc abandons the whole file on this error, so two statements sharing a
/// line (`bad code`) leave nothing to check.
const MISSING_SEMICOLON: &str =
    "Expected a semicolon or an implicit semicolon after a statement, but found none";
const MAX_SEMICOLON_REPAIRS: usize = 32;

/// Value-level globals provided by the ES library and the Node.js runtime.
static KNOWN_GLOBALS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AbortController", "AbortSignal", "AggregateError", "Array", "ArrayBuffer", "Atomics",
        "BigInt", "BigInt64Array", "BigUint64Array", "Blob", "Boolean", "BroadcastChannel",
        "Buffer", "DataView", "Date", "Error", "EvalError", "Event", "EventTarget",
        "FinalizationRegistry", "Float32Array", "Float64Array", "FormData", "Function",
        "Headers", "Infinity", "Int16Array", "Int32Array", "Int8Array", "Intl", "Iterator",
        "JSON", "Map", "Math", "MessageChannel", "MessagePort", "NaN", "Number", "Object",
        "Promise", "Proxy", "RangeError", "ReadableStream", "ReferenceError", "Reflect",
        "RegExp", "Request", "Response", "Set", "SharedArrayBuffer", "String", "Symbol",
        "SyntaxError", "TextDecoder", "TextEncoder", "TransformStream", "TypeError",
        "URIError", "URL", "URLSearchParams", "Uint16Array", "Uint32Array", "Uint8Array",
        "Uint8ClampedArray", "WeakMap", "WeakRef", "WeakSet", "WebAssembly", "WritableStream",
        "__dirname", "__filename", "arguments", "atob", "btoa", "clearImmediate",
        "clearInterval", "clearTimeout", "console", "crypto", "decodeURI",
        "decodeURIComponent", "encodeURI", "encodeURIComponent", "escape", "eval", "exports",
        "fetch", "global", "globalThis", "isFinite", "isNaN", "module", "navigator",
        "parseFloat", "parseInt", "performance", "process", "queueMicrotask", "require",
        "setImmediate", "setInterval", "setTimeout", "structuredClone", "undefined",
        "unescape",
    ]
    .into_iter()
    .collect()
});

struct SourceFile {
    path: PathBuf,
    text: String,
}

impl SourceFile {
    fn is_declaration_file(&self) -> bool {
        is_declaration_file(&self.path)
    }
}

fn is_declaration_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.ends_with(".d.ts") || name.ends_with(".d.mts") || name.ends_with(".d.cts")
}

fn is_typescript_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("ts" | "tsx" | "mts" | "cts")
    )
}

fn source_type(path: &Path) -> SourceType {
    SourceType::from_path(path).unwrap_or_else(|_| SourceType::ts())
}

/// `lib/util.ts` -> `lib/util.d.ts`, keeping `.mts`/`.cts` flavours.
fn declaration_path(relative: &Path) -> PathBuf {
    let extension = match relative.extension().and_then(|ext| ext.to_str()) {
        Some("mts") => "d.mts",
        Some("cts") => "d.cts",
        _ => "d.ts",
    };
    relative.with_extension(extension)
}

fn locate(path: &Path, text: &str, span: Span) -> DiagnosticLocation {
    DiagnosticLocation::from_span(path, text, span.start as usize, span.size() as usize)
}

fn from_oxc(path: &Path, text: &str, error: &OxcDiagnostic) -> Diagnostic {
    let diagnostic = Diagnostic::new(error.message.to_string());
    match error.labels.as_ref().and_then(|labels| labels.first()) {
        Some(label) => diagnostic.at(DiagnosticLocation::from_span(path, text, label.offset(), label.len())),
        None => diagnostic.at(DiagnosticLocation::from_span(path, text, 0, 0)),
    }
}

/// Static checks over a TypeScript program built with oxc: syntax and
/// semantic errors, module resolution, unresolved names, plus the subset of
/// [`CompilerOptions`] that needs no type information.
#[derive(Debug, Clone, Default)]
pub struct OxcTypeChecker;

impl OxcTypeChecker {
    pub fn new() -> Self {
        Self
    }

    /// Root files plus every relative import reachable from them.
    async fn load_program(&self, root_files: &[PathBuf]) -> (Vec<SourceFile>, Vec<Diagnostic>) {
        let mut resolver = NodeModuleResolver::new();
        let mut files = Vec::new();
        let mut diagnostics = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<PathBuf> = root_files.iter().map(|p| normalize_path(p)).collect();

        while let Some(path) = queue.pop_front() {
            if !seen.insert(path.clone()) {
                continue;
            }
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(_) => {
                    diagnostics.push(
                        Diagnostic::new(format!("File '{}' not found.", path.display()))
                            .with_code(FILE_NOT_FOUND),
                    );
                    continue;
                }
            };

            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            for (specifier, span) in module_specifiers(&path, &text) {
                let found = if NodeModuleResolver::is_relative(&specifier) {
                    match resolver.resolve_relative(&specifier, &dir, &TYPESCRIPT_EXTENSIONS).await {
                        Some(resolved) => {
                            if is_typescript_file(&resolved) {
                                queue.push_back(resolved);
                            }
                            true
                        }
                        None => false,
                    }
                } else {
                    NodeModuleResolver::is_builtin(&specifier)
                        || NodeModuleResolver::package_exists(&specifier, &dir).await
                };

                if !found {
                    diagnostics.push(
                        Diagnostic::new(format!(
                            "Cannot find module '{}' or its corresponding type declarations.",
                            specifier
                        ))
                        .at(locate(&path, &text, span))
                        .with_code(CANNOT_FIND_MODULE),
                    );
                }
            }

            files.push(SourceFile { path, text });
        }

        (files, diagnostics)
    }
}

#[async_trait::async_trait]
impl TypeChecker for OxcTypeChecker {
    fn name(&self) -> &str {
        "typecheck"
    }

    async fn check(&self, request: &TypeCheckRequest) -> Result<TypeCheckOutput> {
        let _timer = Timer::start("Type check");
        Logger::type_check_start(self.name(), request.root_files.len());

        let (files, mut pre_emit_diagnostics) = self.load_program(&request.root_files).await;
        let files: Vec<Arc<SourceFile>> = files.into_iter().map(Arc::new).collect();

        let ambient = {
            let declaration_files: Vec<_> = files.iter().filter(|f| f.is_declaration_file()).cloned().collect();
            let names = tokio::task::spawn_blocking(move || {
                declaration_files
                    .iter()
                    .flat_map(|file| ambient_names(&file.path, &file.text))
                    .collect::<HashSet<String>>()
            })
            .await?;
            Arc::new(names)
        };

        let analyses = join_all(files.iter().cloned().map(|file| {
            let ambient = Arc::clone(&ambient);
            let options = request.options;
            tokio::task::spawn_blocking(move || analyze_file(&file, &ambient, &options))
        }))
        .await;
        for analysis in analyses {
            pre_emit_diagnostics.extend(analysis?);
        }

        let mut output = TypeCheckOutput {
            pre_emit_diagnostics,
            ..Default::default()
        };

        match request.emit {
            EmitMode::None => output.emit_skipped = true,
            EmitMode::DeclarationsOnly
                if request.options.no_emit_on_error && !output.pre_emit_diagnostics.is_empty() =>
            {
                output.emit_skipped = true
            }
            EmitMode::DeclarationsOnly => {
                let emitted = join_all(
                    files
                        .iter()
                        .filter(|file| !file.is_declaration_file())
                        .filter_map(|file| {
                            let relative = file.path.strip_prefix(&request.root_dir).ok()?;
                            let out_path = request.out_dir.join(declaration_path(relative));
                            let file = Arc::clone(file);
                            let isolated = request.options.isolated_declarations;
                            Some(tokio::task::spawn_blocking(move || {
                                emit_declarations(&file, isolated)
                                    .map(|text| OutputFile::new(out_path, text))
                            }))
                        }),
                )
                .await;

                for result in emitted {
                    match result? {
                        Ok(file) => output.emitted_files.push(file),
                        Err(diagnostics) => output.emit_diagnostics.extend(diagnostics),
                    }
                }
            }
        }

        Logger::type_check_complete(
            self.name(),
            output.pre_emit_diagnostics.len() + output.emit_diagnostics.len(),
        );
        Ok(output)
    }
}

/// Static import and export-from specifiers with the span of their string literal.
fn module_specifiers(path: &Path, text: &str) -> Vec<(String, Span)> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, text, source_type(path)).parse();
    ret.program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => Some(&decl.source),
            Statement::ExportNamedDeclaration(decl) => decl.source.as_ref(),
            Statement::ExportAllDeclaration(decl) => Some(&decl.source),
            _ => None,
        })
        .map(|source| (source.value.to_string(), source.span))
        .collect()
}

/// Top-level names a declaration file contributes to the global scope.
fn ambient_names(path: &Path, text: &str) -> Vec<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, text, source_type(path)).parse();
    let mut names = Vec::new();
    for stmt in &ret.program.body {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    binding_names(&declarator.id.kind, &mut names);
                }
            }
            Statement::FunctionDeclaration(func) => {
                names.extend(func.id.as_ref().map(|id| id.name.to_string()))
            }
            Statement::ClassDeclaration(class) => {
                names.extend(class.id.as_ref().map(|id| id.name.to_string()))
            }
            _ => {}
        }
    }
    names
}

/// Parse `text`, repairing statements that run together on one line by turning
/// the blank between them into a semicolon and parsing again. Each repair is
/// reported in `diagnostics`. `None` when the parser still gives up.
fn parse_recovering<'a>(
    allocator: &'a Allocator,
    path: &Path,
    text: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Program<'a>> {
    let mut patched = text.to_string();
    for _ in 0..=MAX_SEMICOLON_REPAIRS {
        let source = allocator.alloc_str(&patched);
        let ret = Parser::new(allocator, source, source_type(path)).parse();
        if !ret.panicked {
            diagnostics.extend(ret.errors.iter().map(|e| from_oxc(path, text, e)));
            return Some(ret.program);
        }

        let Some(offset) = missing_semicolon_offset(&ret.errors, patched.as_bytes()) else {
            diagnostics.extend(ret.errors.iter().map(|e| from_oxc(path, text, e)));
            return None;
        };
        // The repair keeps every byte offset, so spans still index `text`.
        let start = word_start(patched.as_bytes(), offset);
        diagnostics.push(
            Diagnostic::new("Unexpected keyword or identifier.")
                .at(DiagnosticLocation::from_span(path, text, start, offset - start))
                .with_code(UNEXPECTED_TOKEN),
        );
        patched.replace_range(offset..offset + 1, ";");
    }
    None
}

fn missing_semicolon_offset(errors: &[OxcDiagnostic], source: &[u8]) -> Option<usize> {
    errors
        .iter()
        .filter(|error| error.message == MISSING_SEMICOLON)
        .filter_map(|error| error.labels.as_ref()?.first().map(|label| label.offset()))
        .find(|&offset| matches!(source.get(offset), Some(b' ' | b'\t')))
}

/// Start of the identifier or keyword that ends at `end`.
fn word_start(source: &[u8], end: usize) -> usize {
    let mut start = end;
    while start > 0
        && matches!(source[start - 1], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'$')
    {
        start -= 1;
    }
    start
}

fn analyze_file(file: &SourceFile, ambient: &HashSet<String>, options: &CompilerOptions) -> Vec<Diagnostic> {
    let (path, text) = (file.path.as_path(), file.text.as_str());
    let allocator = Allocator::default();
    let mut diagnostics = Vec::new();
    let Some(program) = parse_recovering(&allocator, path, text, &mut diagnostics) else {
        return diagnostics;
    };

    let ret = SemanticBuilder::new()
        .with_check_syntax_error(true)
        .build(&program);
    diagnostics.extend(ret.errors.iter().map(|e| from_oxc(path, text, e)));
    if file.is_declaration_file() {
        return diagnostics;
    }

    let semantic = ret.semantic;
    let mut collector = DeclarationCollector::new(semantic.scoping(), ambient);
    collector.visit_program(&program);

    for (name, span) in &collector.unresolved {
        diagnostics.push(
            Diagnostic::new(format!("Cannot find name '{}'.", name))
                .at(locate(path, text, *span))
                .with_code(CANNOT_FIND_NAME),
        );
    }

    for local in collector.unused(options) {
        diagnostics.push(
            Diagnostic::new(format!("'{}' is declared but its value is never read.", local.name))
                .at(locate(path, text, local.span))
                .with_code(UNUSED_DECLARATION),
        );
    }

    if !options.allow_unused_labels {
        for &node_id in semantic.unused_labels() {
            if let AstKind::LabeledStatement(stmt) = semantic.nodes().kind(node_id) {
                diagnostics.push(
                    Diagnostic::new("Unused label.")
                        .at(locate(path, text, stmt.label.span))
                        .with_code(UNUSED_LABEL),
                );
            }
        }
    }

    for finding in collector.findings.into_iter().filter(|f| f.check.enabled(options)) {
        diagnostics.push(
            Diagnostic::new(finding.message)
                .at(locate(path, text, finding.span))
                .with_code(finding.code),
        );
    }

    diagnostics
}

/// Declarations for one file. Errors from the emitter only fail the emit when
/// `isolated` is set; otherwise types it cannot infer are left out.
fn emit_declarations(file: &SourceFile, isolated: bool) -> std::result::Result<String, Vec<Diagnostic>> {
    let (path, text) = (file.path.as_path(), file.text.as_str());
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, text, source_type(path)).parse();
    if !ret.errors.is_empty() {
        return Err(ret.errors.iter().map(|e| from_oxc(path, text, e)).collect());
    }

    let options = IsolatedDeclarationsOptions { strip_internal: false };
    let declarations = IsolatedDeclarations::new(&allocator, options).build(&ret.program);
    if isolated && !declarations.errors.is_empty() {
        return Err(declarations.errors.iter().map(|e| from_oxc(path, text, e)).collect());
    }

    Ok(Codegen::new().build(&declarations.program).code)
}

/// Whether control never reaches the statement after `stmt`.
fn terminates(stmt: &Statement) -> bool {
    match stmt {
        Statement::ReturnStatement(_)
        | Statement::ThrowStatement(_)
        | Statement::BreakStatement(_)
        | Statement::ContinueStatement(_) => true,
        Statement::BlockStatement(block) => block.body.iter().any(terminates),
        Statement::IfStatement(stmt) => stmt
            .alternate
            .as_ref()
            .is_some_and(|alternate| terminates(&stmt.consequent) && terminates(alternate)),
        Statement::TryStatement(stmt) => {
            let finally_exits = stmt
                .finalizer
                .as_ref()
                .is_some_and(|finalizer| finalizer.body.iter().any(terminates));
            let body_exits = stmt.block.body.iter().any(terminates)
                && stmt
                    .handler
                    .as_ref()
                    .is_none_or(|handler| handler.body.body.iter().any(terminates));
            finally_exits || body_exits
        }
        Statement::SwitchStatement(switch) => switch_terminates(switch),
        Statement::WhileStatement(stmt) => is_true(&stmt.test) && !breaks_out(&stmt.body),
        Statement::DoWhileStatement(stmt) => is_true(&stmt.test) && !breaks_out(&stmt.body),
        Statement::ForStatement(stmt) => {
            stmt.test.as_ref().is_none_or(is_true) && !breaks_out(&stmt.body)
        }
        _ => false,
    }
}

/// A switch with a `default` where no clause falls out the bottom.
fn switch_terminates(switch: &SwitchStatement) -> bool {
    let has_default = switch.cases.iter().any(|case| case.test.is_none());
    let every_clause_exits = switch
        .cases
        .iter()
        .all(|case| case.consequent.is_empty() || case.consequent.iter().any(terminates));
    let last_exits = switch
        .cases
        .last()
        .is_some_and(|case| case.consequent.iter().any(terminates));

    let mut finder = BreakFinder::default();
    for case in &switch.cases {
        finder.visit_statements(&case.consequent);
    }
    has_default && every_clause_exits && last_exits && !finder.found
}

fn is_true(test: &Expression) -> bool {
    matches!(test, Expression::BooleanLiteral(literal) if literal.value)
}

fn breaks_out(body: &Statement) -> bool {
    let mut finder = BreakFinder::default();
    finder.visit_statement(body);
    finder.found
}

/// Statements that do something at run time, as opposed to hoisted or
/// type-only declarations.
fn is_executable(stmt: &Statement) -> bool {
    match stmt {
        Statement::FunctionDeclaration(_) | Statement::EmptyStatement(_) => false,
        Statement::VariableDeclaration(decl) => {
            !decl.declare
                && (decl.kind != VariableDeclarationKind::Var
                    || decl.declarations.iter().any(|d| d.init.is_some()))
        }
        _ => !stmt.is_typescript_syntax(),
    }
}

/// Return types that make falling off the end of a function legal.
fn allows_implicit_return(ty: &TSType, is_async: bool) -> bool {
    match ty {
        TSType::TSVoidKeyword(_)
        | TSType::TSAnyKeyword(_)
        | TSType::TSUnknownKeyword(_)
        | TSType::TSUndefinedKeyword(_) => true,
        TSType::TSUnionType(union) => union.types.iter().any(|t| allows_implicit_return(t, false)),
        TSType::TSTypeReference(reference) if is_async => {
            let is_promise = matches!(
                &reference.type_name,
                TSTypeName::IdentifierReference(ident) if ident.name == "Promise"
            );
            is_promise
                && reference
                    .type_arguments
                    .as_ref()
                    .and_then(|args| args.params.first())
                    .is_some_and(|inner| allows_implicit_return(inner, false))
        }
        _ => false,
    }
}

fn has_override(element: &ClassElement) -> bool {
    match element {
        ClassElement::MethodDefinition(method) => method.r#override,
        ClassElement::PropertyDefinition(property) => property.r#override || property.declare,
        ClassElement::AccessorProperty(accessor) => accessor.r#override,
        ClassElement::StaticBlock(_) | ClassElement::TSIndexSignature(_) => true,
    }
}

/// Finds a `break` that leaves the statement it is run over.
#[derive(Default)]
struct BreakFinder {
    depth: usize,
    found: bool,
}

impl BreakFinder {
    fn nested(&mut self, inner: impl FnOnce(&mut Self)) {
        self.depth += 1;
        inner(self);
        self.depth -= 1;
    }
}

impl<'a> Visit<'a> for BreakFinder {
    fn visit_break_statement(&mut self, stmt: &BreakStatement<'a>) {
        if stmt.label.is_some() || self.depth == 0 {
            self.found = true;
        }
    }

    fn visit_while_statement(&mut self, stmt: &WhileStatement<'a>) {
        self.nested(|v| walk::walk_while_statement(v, stmt));
    }

    fn visit_do_while_statement(&mut self, stmt: &DoWhileStatement<'a>) {
        self.nested(|v| walk::walk_do_while_statement(v, stmt));
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.nested(|v| walk::walk_for_statement(v, stmt));
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        self.nested(|v| walk::walk_for_in_statement(v, stmt));
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        self.nested(|v| walk::walk_for_of_statement(v, stmt));
    }

    fn visit_switch_statement(&mut self, stmt: &SwitchStatement<'a>) {
        self.nested(|v| walk::walk_switch_statement(v, stmt));
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}
}

/// Return statements of one function body, nested functions excluded.
#[derive(Default)]
struct ReturnCollector {
    with_value: usize,
    bare: Vec<Span>,
}

impl<'a> Visit<'a> for ReturnCollector {
    fn visit_return_statement(&mut self, stmt: &ReturnStatement<'a>) {
        match stmt.argument {
            Some(_) => self.with_value += 1,
            None => self.bare.push(stmt.span),
        }
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Local,
    Exported,
    Parameter,
}

struct LocalDeclaration {
    symbol_id: SymbolId,
    name: String,
    span: Span,
    binding: Binding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    UnreachableCode,
    ImplicitReturns,
    ImplicitOverride,
}

impl Check {
    fn enabled(self, options: &CompilerOptions) -> bool {
        match self {
            Check::UnreachableCode => !options.allow_unreachable_code,
            Check::ImplicitReturns => options.no_implicit_returns,
            Check::ImplicitOverride => options.no_implicit_override,
        }
    }
}

struct Finding {
    check: Check,
    span: Span,
    message: String,
    code: u32,
}

#[derive(Clone)]
struct ClassMember {
    name: String,
    is_static: bool,
    is_abstract: bool,
}

/// Walks one program collecting unresolved value references, candidates for
/// the unused checks, and the control-flow and override findings.
struct DeclarationCollector<'s> {
    scoping: &'s Scoping,
    ambient: &'s HashSet<String>,
    unresolved: Vec<(String, Span)>,
    declarations: Vec<LocalDeclaration>,
    findings: Vec<Finding>,
    /// Members of each class declared so far, inherited ones included.
    class_members: HashMap<SymbolId, Vec<ClassMember>>,
    /// Set while descending into the declaration of an export statement.
    exporting: bool,
}

impl<'s> DeclarationCollector<'s> {
    fn new(scoping: &'s Scoping, ambient: &'s HashSet<String>) -> Self {
        Self {
            scoping,
            ambient,
            unresolved: Vec::new(),
            declarations: Vec::new(),
            findings: Vec::new(),
            class_members: HashMap::new(),
            exporting: false,
        }
    }

    fn declare(&mut self, symbol_id: Option<SymbolId>, name: &str, span: Span, binding: Binding) {
        if let Some(symbol_id) = symbol_id {
            self.declarations.push(LocalDeclaration {
                symbol_id,
                name: name.to_string(),
                span,
                binding,
            });
        }
    }

    fn declare_pattern(&mut self, kind: &BindingPatternKind, binding: Binding) {
        match kind {
            BindingPatternKind::BindingIdentifier(ident) => {
                self.declare(ident.symbol_id.get(), &ident.name, ident.span, binding)
            }
            BindingPatternKind::ObjectPattern(pattern) => {
                for property in &pattern.properties {
                    self.declare_pattern(&property.value.kind, binding);
                }
                if let Some(rest) = &pattern.rest {
                    self.declare_pattern(&rest.argument.kind, binding);
                }
            }
            BindingPatternKind::ArrayPattern(pattern) => {
                for element in pattern.elements.iter().flatten() {
                    self.declare_pattern(&element.kind, binding);
                }
                if let Some(rest) = &pattern.rest {
                    self.declare_pattern(&rest.argument.kind, binding);
                }
            }
            BindingPatternKind::AssignmentPattern(pattern) => {
                self.declare_pattern(&pattern.left.kind, binding)
            }
        }
    }

    /// Parameter properties (`constructor(private x)`) are class members, not parameters.
    fn declare_parameters(&mut self, params: &FormalParameters) {
        for param in params.items.iter().filter(|param| !param.has_modifier()) {
            self.declare_pattern(&param.pattern.kind, Binding::Parameter);
        }
        if let Some(rest) = &params.rest {
            self.declare_pattern(&rest.argument.kind, Binding::Parameter);
        }
    }

    fn is_used(&self, symbol_id: SymbolId) -> bool {
        self.scoping
            .get_resolved_reference_ids(symbol_id)
            .iter()
            .any(|&reference_id| {
                let reference = self.scoping.get_reference(reference_id);
                reference.is_read() || reference.is_type()
            })
    }

    fn unused(&self, options: &CompilerOptions) -> Vec<&LocalDeclaration> {
        let root = self.scoping.root_scope_id();
        self.declarations
            .iter()
            .filter(|local| {
                let checked = match local.binding {
                    Binding::Parameter => options.no_unused_parameters,
                    Binding::Exported => {
                        options.no_unused_locals
                            && self.scoping.symbol_scope_id(local.symbol_id) != root
                    }
                    Binding::Local => options.no_unused_locals,
                };
                checked && !local.name.starts_with('_') && !self.is_used(local.symbol_id)
            })
            .collect()
    }

    fn report(&mut self, check: Check, span: Span, message: impl Into<String>, code: u32) {
        self.findings.push(Finding {
            check,
            span,
            message: message.into(),
            code,
        });
    }

    /// Executable statements after one that never completes.
    fn check_reachability(&mut self, statements: &[Statement]) {
        let mut dead = statements
            .iter()
            .skip_while(|stmt| !terminates(stmt))
            .skip(1)
            .filter(|stmt| is_executable(stmt));
        let Some(first) = dead.next() else {
            return;
        };
        let end = dead.last().unwrap_or(first).span().end;
        self.report(
            Check::UnreachableCode,
            Span::new(first.span().start, end),
            "Unreachable code detected.",
            UNREACHABLE_CODE,
        );
    }

    /// A body that returns a value on some paths must not fall off its end.
    fn check_returns(
        &mut self,
        body: &FunctionBody,
        return_type: Option<&TSTypeAnnotation>,
        is_async: bool,
        name_span: Span,
    ) {
        if return_type.is_some_and(|annotation| allows_implicit_return(&annotation.type_annotation, is_async)) {
            return;
        }

        let mut returns = ReturnCollector::default();
        returns.visit_function_body(body);
        if returns.with_value == 0 {
            return;
        }

        if !body.statements.iter().any(terminates) {
            let span = return_type.map_or(name_span, |annotation| annotation.type_annotation.span());
            self.report(Check::ImplicitReturns, span, "Not all code paths return a value.", NOT_ALL_PATHS_RETURN);
        }
        for span in returns.bare {
            self.report(Check::ImplicitReturns, span, "Not all code paths return a value.", NOT_ALL_PATHS_RETURN);
        }
    }

    /// Members that shadow a member of a base class declared in this file
    /// must say `override`.
    fn check_overrides(&mut self, class: &Class) {
        let base = match &class.super_class {
            Some(Expression::Identifier(ident)) => Some(ident),
            _ => None,
        };
        let inherited = base
            .and_then(|ident| ident.reference_id.get())
            .and_then(|reference_id| self.scoping.get_reference(reference_id).symbol_id())
            .and_then(|symbol_id| self.class_members.get(&symbol_id))
            .cloned()
            .unwrap_or_default();

        let mut members = inherited.clone();
        for element in &class.body.body {
            if element.method_definition_kind() == Some(MethodDefinitionKind::Constructor) {
                continue;
            }
            let Some(name) = element.static_name() else {
                continue;
            };

            let overridden = inherited
                .iter()
                .find(|member| member.name == name && member.is_static == element.r#static());
            if let (Some(member), Some(base), false) = (overridden, base, has_override(element)) {
                let (message, code) = if member.is_abstract {
                    (
                        format!("This member must have an 'override' modifier because it overrides an abstract method that is declared in the base class '{}'.", base.name),
                        MISSING_ABSTRACT_OVERRIDE,
                    )
                } else {
                    (
                        format!("This member must have an 'override' modifier because it overrides a member in the base class '{}'.", base.name),
                        MISSING_OVERRIDE,
                    )
                };
                let span = element.property_key().map_or(element.span(), |key| key.span());
                self.report(Check::ImplicitOverride, span, message, code);
            }

            members.push(ClassMember {
                name: name.into_owned(),
                is_static: element.r#static(),
                is_abstract: element.is_abstract(),
            });
        }

        if let Some(symbol_id) = class.id.as_ref().and_then(|id| id.symbol_id.get()) {
            self.class_members.insert(symbol_id, members);
        }
    }
}

impl<'a> Visit<'a> for DeclarationCollector<'_> {
    fn visit_statements(&mut self, statements: &ArenaVec<'a, Statement<'a>>) {
        self.check_reachability(statements);
        walk::walk_statements(self, statements);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let Some(reference_id) = ident.reference_id.get() else {
            return;
        };
        let reference = self.scoping.get_reference(reference_id);
        let name = ident.name.as_str();
        if reference.symbol_id().is_none()
            && !reference.is_type()
            && !KNOWN_GLOBALS.contains(name)
            && !self.ambient.contains(name)
        {
            self.unresolved.push((name.to_string(), ident.span));
        }
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        self.exporting = decl.declaration.is_some();
        walk::walk_export_named_declaration(self, decl);
        self.exporting = false;
    }

    fn visit_export_default_declaration(&mut self, decl: &ExportDefaultDeclaration<'a>) {
        self.exporting = matches!(
            decl.declaration,
            ExportDefaultDeclarationKind::FunctionDeclaration(_)
                | ExportDefaultDeclarationKind::ClassDeclaration(_)
        );
        walk::walk_export_default_declaration(self, decl);
        self.exporting = false;
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        let binding = if std::mem::take(&mut self.exporting) {
            Binding::Exported
        } else {
            Binding::Local
        };
        if !decl.declare {
            for declarator in &decl.declarations {
                self.declare_pattern(&declarator.id.kind, binding);
            }
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let binding = if std::mem::take(&mut self.exporting) {
            Binding::Exported
        } else {
            Binding::Local
        };
        if let (Some(body), false) = (&func.body, func.declare) {
            if func.is_declaration() {
                if let Some(id) = &func.id {
                    self.declare(id.symbol_id.get(), &id.name, id.span, binding);
                }
            }
            self.declare_parameters(&func.params);
            if !func.generator {
                let name_span = func.id.as_ref().map_or(func.span, |id| id.span);
                self.check_returns(body, func.return_type.as_deref(), func.r#async, name_span);
            }
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        self.declare_parameters(&arrow.params);
        if !arrow.expression {
            self.check_returns(&arrow.body, arrow.return_type.as_deref(), arrow.r#async, arrow.span);
        }
        walk::walk_arrow_function_expression(self, arrow);
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        let exported = std::mem::take(&mut self.exporting);
        if class.is_declaration() && !class.declare {
            if let Some(id) = &class.id {
                let binding = if exported { Binding::Exported } else { Binding::Local };
                self.declare(id.symbol_id.get(), &id.name, id.span, binding);
            }
        }
        self.check_overrides(class);
        walk::walk_class(self, class);
    }

    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        for specifier in decl.specifiers.iter().flatten() {
            let local = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
            };
            self.declare(local.symbol_id.get(), &local.name, local.span, Binding::Local);
        }
        walk::walk_import_declaration(self, decl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(root: &Path, files: Vec<PathBuf>, emit: EmitMode) -> TypeCheckRequest {
        let out_dir = root.join("build");
        TypeCheckRequest {
            root_files: files,
            options: CompilerOptions::strict(),
            emit,
            root_dir: root.join("src"),
            out_dir,
        }
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics.iter().map(|d| d.message_text()).collect()
    }

    fn analyze(text: &str) -> Vec<Diagnostic> {
        analyze_with(text, &CompilerOptions::strict())
    }

    fn analyze_with(text: &str, options: &CompilerOptions) -> Vec<Diagnostic> {
        let file = SourceFile {
            path: PathBuf::from("index.ts"),
            text: text.to_string(),
        };
        analyze_file(&file, &HashSet::new(), options)
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<u32> {
        diagnostics.iter().map(|d| d.code).collect()
    }

    fn position(diagnostic: &Diagnostic) -> (usize, usize) {
        let location = diagnostic.location.as_ref().unwrap();
        (location.line, location.column)
    }

    #[test]
    fn test_unused_and_unresolved() {
        let file = SourceFile {
            path: PathBuf::from("index.ts"),
            text: "import { a, b } from './a';\nimport type { T } from './t';\nconst unused = 1;\nconst _ignored = 2;\nexport const used: T = a;\nfunction helper() {}\nconsole.log(missing);\n".to_string(),
        };
        let diagnostics = analyze_file(&file, &HashSet::new(), &CompilerOptions::strict());
        let messages = messages(&diagnostics);

        assert!(messages.contains(&"Cannot find name 'missing'.".to_string()));
        assert!(messages.contains(&"'b' is declared but its value is never read.".to_string()));
        assert!(messages.contains(&"'unused' is declared but its value is never read.".to_string()));
        assert!(messages.contains(&"'helper' is declared but its value is never read.".to_string()));
        assert!(!messages.iter().any(|m| m.contains("'a'") || m.contains("'T'")));
        assert!(!messages.iter().any(|m| m.contains("_ignored") || m.contains("'used'")));
        assert!(!messages.iter().any(|m| m.contains("console")));
    }

    #[test]
    fn test_unrecoverable_syntax_error_stops_deeper_checks() {
        let diagnostics = analyze("const x: number = ;\nconst unused = 1;\n");
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(|d| d.code != UNUSED_DECLARATION));
        assert_eq!(diagnostics[0].location.as_ref().unwrap().line, 1);
    }

    #[test]
    fn test_statements_on_one_line_are_split_and_checked() {
        let diagnostics = analyze("bad code");

        let found: Vec<_> = diagnostics
            .iter()
            .map(|d| (d.message_text(), position(d)))
            .collect();
        assert_eq!(found.len(), 3, "{:?}", found);
        assert!(found.contains(&("Unexpected keyword or identifier.".to_string(), (1, 1))));
        assert!(found.contains(&("Cannot find name 'bad'.".to_string(), (1, 1))));
        assert!(found.contains(&("Cannot find name 'code'.".to_string(), (1, 5))));
    }

    #[test]
    fn test_every_run_together_statement_is_reported() {
        let diagnostics = analyze("const a = 1 const b = a\nexport { b };\n");
        let unexpected: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.code == UNEXPECTED_TOKEN)
            .map(position)
            .collect();
        assert_eq!(unexpected, vec![(1, 11)]);
        assert!(diagnostics.iter().all(|d| d.code != CANNOT_FIND_NAME));
    }

    #[test]
    fn test_unused_parameters() {
        let diagnostics = analyze(
            "export function f(a: number, _b: number): number { return 1; }\n\
             export const g = (c: string, d: string) => d;\n\
             export class K { constructor(private readonly e: number) {} }\n\
             export declare function h(f: number): void;\n",
        );
        let messages = messages(&diagnostics);
        assert!(messages.contains(&"'a' is declared but its value is never read.".to_string()));
        assert!(messages.contains(&"'c' is declared but its value is never read.".to_string()));
        assert_eq!(messages.len(), 2, "{:?}", messages);

        let options = CompilerOptions {
            no_unused_parameters: false,
            ..CompilerOptions::strict()
        };
        let diagnostics = analyze_with("export function f(a: number): number { return 1; }\n", &options);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_unreachable_code() {
        let source = "export function f(x: number): number {\n  if (x > 1) {\n    return 1;\n  } else {\n    throw new Error('no');\n  }\n  x++;\n  return x;\n}\n";
        let diagnostics = analyze(source);
        assert_eq!(codes(&diagnostics), vec![UNREACHABLE_CODE]);
        assert_eq!(diagnostics[0].message_text(), "Unreachable code detected.");
        assert_eq!(position(&diagnostics[0]), (7, 3));

        let options = CompilerOptions {
            allow_unreachable_code: true,
            ..CompilerOptions::strict()
        };
        assert!(analyze_with(source, &options).is_empty());
    }

    #[test]
    fn test_loops_with_breaks_stay_reachable() {
        let diagnostics = analyze(
            "export function f(items: number[]): number {\n  let total = 0;\n  while (true) {\n    for (const item of items) {\n      if (item < 0) break;\n      total += item;\n    }\n    if (total > 10) break;\n  }\n  return total;\n}\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_unused_label() {
        let source = "export function f(items: number[]): void {\n  outer: for (const item of items) {\n    console.log(item);\n  }\n  inner: for (const item of items) {\n    if (item) continue inner;\n  }\n}\n";
        let diagnostics = analyze(source);
        assert_eq!(codes(&diagnostics), vec![UNUSED_LABEL]);
        assert_eq!(diagnostics[0].message_text(), "Unused label.");
        assert_eq!(position(&diagnostics[0]), (2, 3));

        let options = CompilerOptions {
            allow_unused_labels: true,
            ..CompilerOptions::strict()
        };
        assert!(analyze_with(source, &options).is_empty());
    }

    #[test]
    fn test_implicit_returns() {
        let source = "export function sign(x: number): number {\n  if (x > 0) {\n    return 1;\n  }\n}\n";
        let diagnostics = analyze(source);
        assert_eq!(codes(&diagnostics), vec![NOT_ALL_PATHS_RETURN]);
        assert_eq!(diagnostics[0].message_text(), "Not all code paths return a value.");
        assert_eq!(position(&diagnostics[0]), (1, 34));

        let options = CompilerOptions {
            no_implicit_returns: false,
            ..CompilerOptions::strict()
        };
        assert!(analyze_with(source, &options).is_empty());
    }

    #[test]
    fn test_complete_returns_pass() {
        let diagnostics = analyze(
            "export function pick(x: number): string {\n  switch (x) {\n    case 0:\n      return 'zero';\n    default:\n      return 'many';\n  }\n}\n\
             export function log(x: number): void {\n  if (x) {\n    return;\n  }\n  console.log(x);\n}\n\
             export async function maybe(x: number): Promise<number | undefined> {\n  if (x) {\n    return x;\n  }\n}\n",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_missing_override() {
        let source = "class Base {\n  greet(): string { return 'hi'; }\n  static create(): void {}\n}\n\
                      abstract class Shape {\n  abstract area(): number;\n}\n\
                      export class Child extends Base {\n  greet(): string { return 'hey'; }\n  create(): void {}\n}\n\
                      export class Square extends Shape {\n  area(): number { return 4; }\n}\n\
                      export class Ok extends Base {\n  override greet(): string { return 'ok'; }\n}\n";
        let diagnostics = analyze(source);
        let messages = messages(&diagnostics);
        assert_eq!(
            messages,
            vec![
                "This member must have an 'override' modifier because it overrides a member in the base class 'Base'.".to_string(),
                "This member must have an 'override' modifier because it overrides an abstract method that is declared in the base class 'Shape'.".to_string(),
            ]
        );
        assert_eq!(codes(&diagnostics), vec![MISSING_OVERRIDE, MISSING_ABSTRACT_OVERRIDE]);

        let options = CompilerOptions {
            no_implicit_override: false,
            ..CompilerOptions::strict()
        };
        assert!(analyze_with(source, &options).is_empty());
    }

    #[test]
    fn test_declaration_path() {
        assert_eq!(declaration_path(Path::new("lib/util.ts")), PathBuf::from("lib/util.d.ts"));
        assert_eq!(declaration_path(Path::new("a.mts")), PathBuf::from("a.d.mts"));
        assert_eq!(declaration_path(Path::new("b.tsx")), PathBuf::from("b.d.ts"));
    }

    #[tokio::test]
    async fn test_missing_module_reported() {
        let temp_dir = tempdir().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let index = src.join("index.ts");
        std::fs::write(&index, "export * from './nowhere';\nexport * from 'node:path';\n").unwrap();

        let checker = OxcTypeChecker::new();
        let output = checker
            .check(&request(temp_dir.path(), vec![index], EmitMode::None))
            .await
            .unwrap();

        assert!(output.emit_skipped);
        assert_eq!(output.pre_emit_diagnostics.len(), 1);
        let diagnostic = &output.pre_emit_diagnostics[0];
        assert_eq!(diagnostic.code, CANNOT_FIND_MODULE);
        assert_eq!(
            diagnostic.message_text(),
            "Cannot find module './nowhere' or its corresponding type declarations."
        );
    }

    #[tokio::test]
    async fn test_declarations_emitted_for_reachable_files() {
        let temp_dir = tempdir().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(src.join("lib")).unwrap();
        std::fs::write(src.join("index.ts"), "export { thing } from './lib/thing.js';\n").unwrap();
        std::fs::write(src.join("lib").join("thing.ts"), "export const thing = 'world';\n").unwrap();

        let checker = OxcTypeChecker::new();
        let output = checker
            .check(&request(temp_dir.path(), vec![src.join("index.ts")], EmitMode::DeclarationsOnly))
            .await
            .unwrap();

        assert!(output.pre_emit_diagnostics.is_empty(), "{:?}", output.pre_emit_diagnostics);
        assert!(!output.emit_skipped);
        let mut paths: Vec<_> = output.emitted_files.iter().map(|f| f.path.clone()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                temp_dir.path().join("build").join("index.d.ts"),
                temp_dir.path().join("build").join("lib").join("thing.d.ts"),
            ]
        );
        let thing = output
            .emitted_files
            .iter()
            .find(|f| f.path.ends_with("thing.d.ts"))
            .unwrap();
        assert!(thing.text.contains("export declare const thing = \"world\";"));
    }

    #[tokio::test]
    async fn test_uninferable_declarations_still_emit() {
        let temp_dir = tempdir().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("index.ts"),
            "export function add(a: number, b: number) { return a + b; }\n",
        )
        .unwrap();

        let mut request = request(temp_dir.path(), vec![src.join("index.ts")], EmitMode::DeclarationsOnly);
        let output = OxcTypeChecker::new().check(&request).await.unwrap();
        assert!(output.emit_diagnostics.is_empty(), "{:?}", output.emit_diagnostics);
        assert_eq!(output.emitted_files.len(), 1);
        assert!(output.emitted_files[0]
            .text
            .contains("export declare function add(a: number, b: number)"));

        request.options.isolated_declarations = true;
        let output = OxcTypeChecker::new().check(&request).await.unwrap();
        assert!(!output.emit_diagnostics.is_empty());
        assert!(output.emitted_files.is_empty());
    }

    #[tokio::test]
    async fn test_emit_skipped_on_errors() {
        let temp_dir = tempdir().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("index.ts"), "const unused = 1;\n").unwrap();

        let output = OxcTypeChecker::new()
            .check(&request(temp_dir.path(), vec![src.join("index.ts")], EmitMode::DeclarationsOnly))
            .await
            .unwrap();
        assert!(output.emit_skipped);
        assert!(output.emitted_files.is_empty());
        assert_eq!(output.pre_emit_diagnostics[0].code, UNUSED_DECLARATION);
    }
}
