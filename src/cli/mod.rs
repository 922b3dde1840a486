// Command line entry
pub mod commands;

pub use commands::*;
