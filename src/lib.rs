//! Type-check a directory of TypeScript modules, then emit it as ESM,
//! CommonJS or declaration files, per file or as a single bundle.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod plugins;
pub mod utils;

pub use crate::core::models::{BuildMode, CompileOptions, CompileResult, OutputIntent};
pub use crate::core::services::{compile, CompileService};
pub use crate::utils::{BuilderError, Result};
