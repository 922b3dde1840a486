// Core domain layer
pub mod compiler_options;
pub mod diagnostics;
pub mod interfaces;
pub mod models;
pub mod plugin;
pub mod services;

pub use compiler_options::*;
pub use diagnostics::*;
pub use interfaces::*;
pub use models::*;
pub use plugin::*;
pub use services::*;
