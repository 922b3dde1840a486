use super::{render_diagnostics, ProcessResult};
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_sourcemap::SourceMap;
use oxc_span::SourceType;
use std::path::Path;

/// How a piece of generated JavaScript is parsed before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Module,
    Script,
}

impl ChunkKind {
    fn source_type(self) -> SourceType {
        match self {
            ChunkKind::Module => SourceType::mjs(),
            ChunkKind::Script => SourceType::mjs().with_module(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmittedCode {
    pub code: String,
    pub map: Option<SourceMap>,
}

/// Prints programs with oxc, optionally compressing and mangling them first
#[derive(Debug, Clone, Copy)]
pub struct OxcMinifier {
    minify: bool,
}

impl OxcMinifier {
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }

    pub fn is_enabled(&self) -> bool {
        self.minify
    }

    /// Print an already transformed program. `source_map_path` names the
    /// original source in the generated map; no map is produced without it.
    pub fn emit<'a>(
        &self,
        allocator: &'a Allocator,
        program: &mut Program<'a>,
        source_map_path: Option<&Path>,
    ) -> EmittedCode {
        let scoping = if self.minify {
            let options = MinifierOptions {
                mangle: Some(MangleOptions::default()),
                compress: Some(CompressOptions::default()),
            };
            Minifier::new(options).minify(allocator, program).scoping
        } else {
            None
        };

        let ret = Codegen::new()
            .with_options(self.codegen_options(source_map_path))
            .with_scoping(scoping)
            .build(program);

        EmittedCode {
            code: ret.code,
            map: ret.map,
        }
    }

    /// Re-parse generated code and print it. With `optimize` unset only
    /// whitespace is removed, so top-level names shared between pieces survive.
    pub fn print(
        &self,
        name: &Path,
        code: &str,
        kind: ChunkKind,
        optimize: bool,
        source_map: bool,
    ) -> ProcessResult<EmittedCode> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, kind.source_type()).parse();
        if !ret.errors.is_empty() {
            return Err(render_diagnostics(name, code, &ret.errors));
        }

        let mut program = ret.program;
        let source_map_path = source_map.then_some(name);
        if optimize {
            return Ok(self.emit(&allocator, &mut program, source_map_path));
        }

        let ret = Codegen::new()
            .with_options(self.codegen_options(source_map_path))
            .build(&program);
        Ok(EmittedCode {
            code: ret.code,
            map: ret.map,
        })
    }

    fn codegen_options(&self, source_map_path: Option<&Path>) -> CodegenOptions {
        let mut options = if self.minify {
            CodegenOptions::minify()
        } else {
            CodegenOptions::default()
        };
        options.source_map_path = source_map_path.map(Path::to_path_buf);
        options
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new(false)
    }
}
