/// Checks the type-checker enforces. Every compile runs with the strict
/// table; emission settings travel on the request instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Any diagnostic suppresses declaration emit.
    pub no_emit_on_error: bool,
    pub no_unused_locals: bool,
    pub no_unused_parameters: bool,
    pub no_implicit_returns: bool,
    pub no_implicit_override: bool,
    pub allow_unused_labels: bool,
    pub allow_unreachable_code: bool,
    /// Surface the errors of isolated declaration emit. When off, whatever the
    /// emitter can produce is written.
    pub isolated_declarations: bool,
}

impl CompilerOptions {
    pub fn strict() -> Self {
        Self {
            no_emit_on_error: true,
            no_unused_locals: true,
            no_unused_parameters: true,
            no_implicit_returns: true,
            no_implicit_override: true,
            allow_unused_labels: false,
            allow_unreachable_code: false,
            isolated_declarations: false,
        }
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    None,
    DeclarationsOnly,
}
