// Exclude Source Maps Plugin: neutralises source map comments in third-party JavaScript

use crate::core::plugin::{LoadArgs, LoadResult, Loader, Plugin};
use crate::utils::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static NODE_MODULES: Lazy<Regex> = Lazy::new(|| Regex::new("node_modules").unwrap());

/// Inline source map with no mappings, appended after the original contents
/// so it takes precedence over any comment the file carries.
pub const EMPTY_SOURCE_MAP_COMMENT: &str =
    "//# sourceMappingURL=data:application/json;base64,eyJ2ZXJzaW9uIjozLCJzb3VyY2VzIjpbIiJdLCJtYXBwaW5ncyI6IkEifQ==";

const JS_EXTENSIONS: [&str; 3] = ["js", "mjs", "cjs"];

pub struct ExcludeSourceMapsPlugin {
    filter: Regex,
}

impl ExcludeSourceMapsPlugin {
    pub fn new(filter: Regex) -> Self {
        Self { filter }
    }

    pub fn with_pattern(pattern: &str) -> Result<Self> {
        Ok(Self::new(Regex::new(pattern)?))
    }
}

impl Default for ExcludeSourceMapsPlugin {
    fn default() -> Self {
        Self::new(NODE_MODULES.clone())
    }
}

#[async_trait]
impl Plugin for ExcludeSourceMapsPlugin {
    fn name(&self) -> &str {
        "exclude-source-maps"
    }

    fn load_filter(&self) -> Option<&Regex> {
        Some(&self.filter)
    }

    async fn on_load(&self, args: &LoadArgs) -> Result<Option<LoadResult>> {
        let is_js = args
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| JS_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !is_js {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&args.path).await?;
        Ok(Some(LoadResult {
            contents: format!("{}\n{}", contents, EMPTY_SOURCE_MAP_COMMENT),
            loader: Some(Loader::Js),
        }))
    }
}
