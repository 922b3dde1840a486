// Processors module
pub mod linker;
pub mod minifier;
pub mod module_record;
pub mod transpiler;

pub use linker::*;
pub use minifier::*;
pub use module_record::*;
pub use transpiler::*;

use crate::core::diagnostics::line_column;
use oxc_diagnostics::OxcDiagnostic;
use std::path::Path;

/// Outcome of CPU-bound module work; errors are already rendered for display.
pub type ProcessResult<T> = std::result::Result<T, Vec<String>>;

/// `path:line:col: message`, or `path: message` when the diagnostic has no label.
pub fn render_diagnostic(path: &Path, source: &str, error: &OxcDiagnostic) -> String {
    let position = error
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| line_column(source, label.offset()));

    match position {
        Some((line, column)) => format!("{}:{}:{}: {}", path.display(), line, column, error.message),
        None => format!("{}: {}", path.display(), error.message),
    }
}

pub fn render_diagnostics(path: &Path, source: &str, errors: &[OxcDiagnostic]) -> Vec<String> {
    errors
        .iter()
        .map(|error| render_diagnostic(path, source, error))
        .collect()
}
