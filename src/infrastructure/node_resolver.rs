use crate::core::models::ImportKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Extensions probed when resolving for the type-checker.
pub const TYPESCRIPT_EXTENSIONS: [&str; 6] = [".ts", ".tsx", ".d.ts", ".mts", ".cts", ".json"];

/// Extensions probed when resolving for the bundler.
pub const BUNDLE_EXTENSIONS: [&str; 8] = [".ts", ".tsx", ".mts", ".cts", ".js", ".mjs", ".cjs", ".json"];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "zlib",
];

/// Package.json structure for parsing npm packages
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub exports: Option<Value>,
}

/// Node.js-style module resolution implementation
pub struct NodeModuleResolver {
    /// Cache of package.json files
    package_cache: HashMap<PathBuf, Option<PackageJson>>,
}

impl NodeModuleResolver {
    pub fn new() -> Self {
        Self {
            package_cache: HashMap::new(),
        }
    }

    /// `node:`-prefixed specifiers and the bare names of Node's core modules.
    pub fn is_builtin(specifier: &str) -> bool {
        if specifier.starts_with("node:") {
            return true;
        }
        let root = specifier.split('/').next().unwrap_or(specifier);
        NODE_BUILTINS.contains(&root)
    }

    pub fn is_relative(specifier: &str) -> bool {
        specifier == "."
            || specifier == ".."
            || specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/')
    }

    /// Resolve a relative specifier against the importing directory
    pub async fn resolve_relative(
        &mut self,
        specifier: &str,
        from_dir: &Path,
        extensions: &[&str],
    ) -> Option<PathBuf> {
        self.resolve_file_or_directory(&from_dir.join(specifier), extensions).await
    }

    /// Resolve a bare specifier through the `node_modules` directories above `from_dir`
    pub async fn resolve_package(
        &mut self,
        specifier: &str,
        from_dir: &Path,
        kind: ImportKind,
    ) -> Option<PathBuf> {
        let (pkg_name, subpath) = parse_package_specifier(specifier);
        let package_dir = find_package_dir(&pkg_name, from_dir).await?;
        self.resolve_package_entry(&package_dir, subpath, kind).await
    }

    /// Whether a bare specifier names an installed package (or its `@types` companion)
    pub async fn package_exists(specifier: &str, from_dir: &Path) -> bool {
        let (pkg_name, _) = parse_package_specifier(specifier);
        if find_package_dir(&pkg_name, from_dir).await.is_some() {
            return true;
        }
        let types_name = format!("@types/{}", pkg_name.trim_start_matches('@').replace('/', "__"));
        find_package_dir(&types_name, from_dir).await.is_some()
    }

    /// Module format declared by the nearest package.json above `file`
    pub async fn package_type_for(&mut self, file: &Path) -> Option<String> {
        let mut current = file.parent();
        while let Some(dir) = current {
            if let Some(pkg) = self.read_package_json(&dir.join("package.json")).await {
                return pkg.package_type;
            }
            current = dir.parent();
        }
        None
    }

    async fn resolve_package_entry(
        &mut self,
        package_dir: &Path,
        subpath: Option<String>,
        kind: ImportKind,
    ) -> Option<PathBuf> {
        let package_json = self.read_package_json(&package_dir.join("package.json")).await;

        if let Some(exports) = package_json.as_ref().and_then(|pkg| pkg.exports.as_ref()) {
            let key = match &subpath {
                Some(subpath) => format!("./{}", subpath),
                None => ".".to_string(),
            };
            if let Some(target) = select_export(exports, &key, kind) {
                return self
                    .resolve_file_or_directory(&package_dir.join(target), &BUNDLE_EXTENSIONS)
                    .await;
            }
        }

        if let Some(subpath) = subpath {
            return self
                .resolve_file_or_directory(&package_dir.join(subpath), &BUNDLE_EXTENSIONS)
                .await;
        }

        if let Some(pkg) = &package_json {
            let mut fields = Vec::new();
            if kind != ImportKind::RequireCall {
                fields.extend(pkg.module.clone());
            }
            fields.extend(pkg.main.clone());
            for field in fields {
                if let Some(resolved) = self
                    .resolve_file_or_directory(&package_dir.join(field), &BUNDLE_EXTENSIONS)
                    .await
                {
                    return Some(resolved);
                }
            }
        }

        let index = package_dir.join("index.js");
        if is_file(&index).await {
            return Some(index);
        }
        None
    }

    /// Try to resolve as file or directory
    async fn resolve_file_or_directory(&mut self, path: &Path, extensions: &[&str]) -> Option<PathBuf> {
        let path = normalize_path(path);
        let path = path.as_path();
        if let Some(file) = resolve_as_file(path, extensions).await {
            return Some(file);
        }

        if !is_dir(path).await {
            return None;
        }

        if let Some(pkg) = self.read_package_json(&path.join("package.json")).await {
            if let Some(main) = &pkg.main {
                // Just check as file, avoid recursion
                if let Some(resolved) = resolve_as_file(&path.join(main), extensions).await {
                    return Some(resolved);
                }
            }
        }

        for ext in extensions {
            let index_file = path.join(format!("index{}", ext));
            if is_file(&index_file).await {
                return Some(index_file);
            }
        }

        None
    }

    /// Read and cache package.json
    async fn read_package_json(&mut self, path: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }

        let package = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<PackageJson>(&content).ok(),
            Err(_) => None,
        };

        self.package_cache.insert(path.to_path_buf(), package.clone());
        package
    }
}

impl Default for NodeModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically remove `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Split `@scope/pkg/sub/path` into package name and subpath
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        match (parts.next(), parts.next()) {
            (Some(scope), Some(pkg)) => format!("{}/{}", scope, pkg),
            (Some(scope), None) => scope.to_string(),
            _ => specifier.to_string(),
        }
    } else {
        parts.next().unwrap_or(specifier).to_string()
    };
    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name, subpath)
}

async fn find_package_dir(pkg_name: &str, from_dir: &Path) -> Option<PathBuf> {
    let mut current = Some(from_dir);
    while let Some(dir) = current {
        let package_dir = dir.join("node_modules").join(pkg_name);
        if is_dir(&package_dir).await {
            return Some(package_dir);
        }
        current = dir.parent();
    }
    None
}

/// Pick the target of an `exports` entry for the given subpath key
fn select_export<'a>(exports: &'a Value, key: &str, kind: ImportKind) -> Option<&'a str> {
    match exports {
        Value::String(target) if key == "." => Some(target),
        Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => {
            map.get(key).and_then(|entry| select_condition(entry, kind))
        }
        Value::Object(_) if key == "." => select_condition(exports, kind),
        _ => None,
    }
}

fn select_condition(entry: &Value, kind: ImportKind) -> Option<&str> {
    let conditions: &[&str] = if kind == ImportKind::RequireCall {
        &["node", "require", "default"]
    } else {
        &["node", "import", "module", "default"]
    };
    match entry {
        Value::String(target) => Some(target),
        Value::Object(map) => conditions
            .iter()
            .filter_map(|condition| map.get(*condition))
            .find_map(|nested| select_condition(nested, kind)),
        Value::Array(items) => items.iter().find_map(|item| select_condition(item, kind)),
        _ => None,
    }
}

async fn resolve_as_file(path: &Path, extensions: &[&str]) -> Option<PathBuf> {
    if is_file(path).await {
        return Some(path.to_path_buf());
    }

    let raw = path.to_string_lossy();

    // `./thing.js` written in TypeScript source names `./thing.ts`
    for (js, ts) in [(".js", ".ts"), (".mjs", ".mts"), (".cjs", ".cts")] {
        if let Some(stem) = raw.strip_suffix(js) {
            let candidate = PathBuf::from(format!("{}{}", stem, ts));
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
    }

    for ext in extensions {
        let candidate = PathBuf::from(format!("{}{}", raw, ext));
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }

    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("lodash"), ("lodash".to_string(), None));
        assert_eq!(
            parse_package_specifier("lodash/fp/map"),
            ("lodash".to_string(), Some("fp/map".to_string()))
        );
        assert_eq!(parse_package_specifier("@babel/core"), ("@babel/core".to_string(), None));
        assert_eq!(
            parse_package_specifier("@babel/core/lib/index.js"),
            ("@babel/core".to_string(), Some("lib/index.js".to_string()))
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/./../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_builtins() {
        assert!(NodeModuleResolver::is_builtin("node:util"));
        assert!(NodeModuleResolver::is_builtin("fs"));
        assert!(NodeModuleResolver::is_builtin("fs/promises"));
        assert!(!NodeModuleResolver::is_builtin("lodash"));
    }

    #[test]
    fn test_select_export_conditions() {
        let exports = json!({ ".": { "require": "./index.cjs", "import": "./index.mjs" } });
        assert_eq!(select_export(&exports, ".", ImportKind::ImportStatement), Some("./index.mjs"));
        assert_eq!(select_export(&exports, ".", ImportKind::RequireCall), Some("./index.cjs"));

        let sugar = json!({ "default": "./main.js" });
        assert_eq!(select_export(&sugar, ".", ImportKind::ImportStatement), Some("./main.js"));
        assert_eq!(select_export(&json!("./x.js"), ".", ImportKind::ImportStatement), Some("./x.js"));
    }

    #[tokio::test]
    async fn test_resolve_relative_typescript() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(&root.join("thing.ts"), "");
        write(&root.join("lib/index.ts"), "");

        let mut resolver = NodeModuleResolver::new();
        assert_eq!(
            resolver.resolve_relative("./thing", root, &TYPESCRIPT_EXTENSIONS).await,
            Some(root.join("thing.ts"))
        );
        assert_eq!(
            resolver.resolve_relative("./thing.js", root, &TYPESCRIPT_EXTENSIONS).await,
            Some(root.join("thing.ts"))
        );
        assert_eq!(
            resolver.resolve_relative("./lib", root, &TYPESCRIPT_EXTENSIONS).await,
            Some(root.join("lib/index.ts"))
        );
        assert_eq!(resolver.resolve_relative("./nope", root, &TYPESCRIPT_EXTENSIONS).await, None);
    }

    #[tokio::test]
    async fn test_resolve_package_walks_up() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(&root.join("node_modules/esm-pkg/package.json"), r#"{"type":"module"}"#);
        write(&root.join("node_modules/esm-pkg/index.js"), "export const a = 1;");
        write(
            &root.join("node_modules/main-pkg/package.json"),
            r#"{"name":"main-pkg","main":"dist/main.js"}"#,
        );
        write(&root.join("node_modules/main-pkg/dist/main.js"), "module.exports = 1;");
        std::fs::create_dir_all(root.join("src/deep")).unwrap();

        let mut resolver = NodeModuleResolver::new();
        let from = root.join("src/deep");
        assert_eq!(
            resolver.resolve_package("esm-pkg", &from, ImportKind::ImportStatement).await,
            Some(root.join("node_modules/esm-pkg/index.js"))
        );
        assert_eq!(
            resolver.resolve_package("main-pkg", &from, ImportKind::ImportStatement).await,
            Some(root.join("node_modules/main-pkg/dist/main.js"))
        );
        assert_eq!(resolver.resolve_package("missing", &from, ImportKind::ImportStatement).await, None);
        assert!(NodeModuleResolver::package_exists("esm-pkg", &from).await);
        assert_eq!(
            resolver.package_type_for(&root.join("node_modules/esm-pkg/index.js")).await,
            Some("module".to_string())
        );
    }
}
