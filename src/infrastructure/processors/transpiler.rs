use super::minifier::{EmittedCode, OxcMinifier};
use super::module_record::parses_as_script;
use super::{render_diagnostics, ProcessResult};
use crate::core::models::ModuleFormat;
use crate::core::plugin::Loader;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Program, Statement, StringLiteral};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{Atom, SourceType};
use oxc_transformer::{TransformOptions, Transformer};
use std::collections::HashMap;
use std::path::Path;

/// Module shape a loaded file is linked with.
pub fn detect_format(path: &Path, code: &str, loader: Loader) -> ModuleFormat {
    match loader {
        Loader::Ts => ModuleFormat::Esm,
        Loader::Json => ModuleFormat::Cjs,
        Loader::Js => match path.extension().and_then(|ext| ext.to_str()) {
            Some("mjs") => ModuleFormat::Esm,
            Some("cjs") => ModuleFormat::Cjs,
            _ if parses_as_script(code) => ModuleFormat::Cjs,
            _ => ModuleFormat::Esm,
        },
    }
}

fn source_type_for(path: &Path, loader: Loader) -> SourceType {
    match loader {
        Loader::Ts => SourceType::from_path(path).unwrap_or_else(|_| SourceType::ts()),
        _ => SourceType::mjs(),
    }
}

/// Lower a loaded file to plain JavaScript. TypeScript is stripped of types,
/// JavaScript is validated and returned untouched.
pub fn transpile(path: &Path, source: &str, loader: Loader) -> ProcessResult<String> {
    match loader {
        Loader::Json => {
            serde_json::from_str::<serde_json::Value>(source)
                .map_err(|e| vec![format!("{}: {}", path.display(), e)])?;
            Ok(source.to_string())
        }
        Loader::Js => {
            let allocator = Allocator::default();
            let source_type = match detect_format(path, source, loader) {
                ModuleFormat::Esm => SourceType::mjs(),
                ModuleFormat::Cjs => SourceType::mjs().with_module(false),
            };
            let ret = Parser::new(&allocator, source, source_type).parse();
            if !ret.errors.is_empty() {
                return Err(render_diagnostics(path, source, &ret.errors));
            }
            Ok(source.to_string())
        }
        Loader::Ts => {
            let allocator = Allocator::default();
            let program = parse_and_strip(&allocator, path, source, loader)?;
            Ok(Codegen::new().build(&program).code)
        }
    }
}

/// Emit a single module as ESM, keeping its own imports and exports but
/// pointing their specifiers at `rewrites`.
pub fn emit_module(
    path: &Path,
    source: &str,
    loader: Loader,
    rewrites: &HashMap<String, String>,
    minifier: OxcMinifier,
    source_map_path: Option<&Path>,
) -> ProcessResult<EmittedCode> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(path, loader)).parse();
    if !ret.errors.is_empty() {
        return Err(render_diagnostics(path, source, &ret.errors));
    }

    let mut program = ret.program;
    rewrite_specifiers(&allocator, &mut program, rewrites);
    strip_types(&allocator, path, source, &mut program)?;
    Ok(minifier.emit(&allocator, &mut program, source_map_path))
}

fn parse_and_strip<'a>(
    allocator: &'a Allocator,
    path: &Path,
    source: &'a str,
    loader: Loader,
) -> ProcessResult<Program<'a>> {
    let ret = Parser::new(allocator, source, source_type_for(path, loader)).parse();
    if !ret.errors.is_empty() {
        return Err(render_diagnostics(path, source, &ret.errors));
    }
    let mut program = ret.program;
    strip_types(allocator, path, source, &mut program)?;
    Ok(program)
}

fn strip_types<'a>(
    allocator: &'a Allocator,
    path: &Path,
    source: &str,
    program: &mut Program<'a>,
) -> ProcessResult<()> {
    if !program.source_type.is_typescript() {
        return Ok(());
    }

    let semantic = SemanticBuilder::new().build(program);
    if !semantic.errors.is_empty() {
        return Err(render_diagnostics(path, source, &semantic.errors));
    }
    let scoping = semantic.semantic.into_scoping();

    let ret = Transformer::new(allocator, path, &TransformOptions::default())
        .build_with_scoping(scoping, program);
    if !ret.errors.is_empty() {
        return Err(render_diagnostics(path, source, &ret.errors));
    }
    Ok(())
}

fn rewrite_specifiers<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    rewrites: &HashMap<String, String>,
) {
    for stmt in program.body.iter_mut() {
        let source = match stmt {
            Statement::ImportDeclaration(decl) => Some(&mut decl.source),
            Statement::ExportNamedDeclaration(decl) => decl.source.as_mut(),
            Statement::ExportAllDeclaration(decl) => Some(&mut decl.source),
            _ => None,
        };
        if let Some(source) = source {
            rewrite_literal(allocator, source, rewrites);
        }
    }
}

fn rewrite_literal<'a>(
    allocator: &'a Allocator,
    literal: &mut StringLiteral<'a>,
    rewrites: &HashMap<String, String>,
) {
    if let Some(target) = rewrites.get(literal.value.as_str()) {
        if target != literal.value.as_str() {
            literal.value = Atom::from(allocator.alloc_str(target));
            literal.raw = None;
        }
    }
}
