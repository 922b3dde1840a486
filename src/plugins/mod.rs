// Built-in bundler plugins

pub mod exclude_source_maps_plugin;
pub mod resolve_paths_plugin;

pub use exclude_source_maps_plugin::{ExcludeSourceMapsPlugin, EMPTY_SOURCE_MAP_COMMENT};
pub use resolve_paths_plugin::ResolveTypescriptPathsPlugin;
