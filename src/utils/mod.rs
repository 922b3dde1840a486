// Shared utilities module
pub mod bundle_analysis;
pub mod config_loader;
pub mod errors;
pub mod logging;
pub mod paths;

pub use bundle_analysis::*;
pub use config_loader::*;
pub use errors::*;
pub use logging::*;
pub use paths::*;
