// Infrastructure layer
pub mod bundler;
pub mod file_system;
pub mod node_resolver;
pub mod processors;
pub mod type_checker;

pub use bundler::*;
pub use file_system::*;
pub use node_resolver::*;
pub use type_checker::*;
