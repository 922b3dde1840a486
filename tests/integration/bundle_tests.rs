mod common;

use common::Project;
use ts_builder::core::models::{ImportKind, OutputIntent};
use ts_builder::core::services::ESM_COMPATIBILITY_PREAMBLE;
use ts_builder::{compile, BuilderError};

#[tokio::test]
async fn test_bundle_inlines_local_imports() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { thing } from './thing';\nexport const hello = thing;\n",
    );
    project.write("src/thing.ts", "export const thing = 'world';\n");

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let result = compile(&options).await.unwrap();

    assert_eq!(result.output_files.len(), 1);
    let file = &result.output_files[0];
    assert_eq!(file.path, project.path("build/index.mjs"));
    assert!(file.text.starts_with(ESM_COMPATIBILITY_PREAMBLE));
    assert!(file.text.contains("world"));
    assert!(!file.text.contains("./thing"));

    let metafile = result.metafile.unwrap();
    assert!(metafile.inputs.contains_key("src/index.ts"));
    assert!(metafile.inputs.contains_key("src/thing.ts"));
    let output = &metafile.outputs["build/index.mjs"];
    assert_eq!(output.entry_point.as_deref(), Some("src/index.ts"));
    assert_eq!(output.exports, vec!["hello".to_string()]);
    assert_eq!(output.bytes, file.text.len());
}

#[tokio::test]
async fn test_bundle_links_default_export() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { hello } from './thing'; export default hello + 'world';",
    );
    project.write("src/thing.ts", "export const hello = 'world';");

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let result = compile(&options).await.unwrap();

    let paths: Vec<_> = result.output_files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, vec![project.path("build/index.mjs")]);
    let file = &result.output_files[0];
    assert!(file.text.contains("export { __e0 as default };"));
    assert!(file.text.contains("\"world\""));
    assert!(!file.text.contains("./thing"));

    let metafile = result.metafile.unwrap();
    assert_eq!(metafile.outputs.len(), 1);
    assert!(!metafile.outputs.contains_key("build/thing.mjs"));
    let output = &metafile.outputs["build/index.mjs"];
    assert_eq!(output.exports, vec!["default".to_string()]);
    assert!(output.inputs.contains_key("src/thing.ts"));
}

#[tokio::test]
async fn test_bundle_keeps_external_packages() {
    let project = Project::with_packages();
    project.write(
        "src/index.ts",
        "import { hello } from 'test-esm-module';\nexport const greeting = hello;\n",
    );

    let options = project
        .options(OutputIntent::Module)
        .with_bundle("index.ts", "index.mjs")
        .with_external(vec!["*".to_string()]);
    let result = compile(&options).await.unwrap();

    let file = &result.output_files[0];
    assert!(file.text.contains("from \"test-esm-module\""));

    let metafile = result.metafile.unwrap();
    assert_eq!(metafile.inputs.len(), 1);
    let import = &metafile.inputs["src/index.ts"].imports[0];
    assert_eq!(import.path, "test-esm-module");
    assert_eq!(import.kind, ImportKind::ImportStatement);
    assert_eq!(import.external, Some(true));
}

#[tokio::test]
async fn test_bundle_inlines_esm_package() {
    let project = Project::with_packages();
    project.write(
        "src/index.ts",
        "import { hello } from 'test-esm-module';\nexport const greeting = hello;\n",
    );

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let result = compile(&options).await.unwrap();

    let file = &result.output_files[0];
    assert!(!file.text.contains("from \"test-esm-module\""));
    assert!(file.text.contains("world"));

    let metafile = result.metafile.unwrap();
    assert!(metafile
        .inputs
        .contains_key("node_modules/test-esm-module/index.js"));
}

#[tokio::test]
async fn test_bundle_inlines_commonjs_package() {
    let project = Project::with_packages();
    project.write(
        "src/index.ts",
        "import { goodbye } from 'test-cjs-module';\nexport const farewell = goodbye;\n",
    );

    let options = project.options(OutputIntent::CommonJs).with_bundle("index.ts", "index.cjs");
    let result = compile(&options).await.unwrap();

    assert_eq!(result.output_files.len(), 1);
    let file = &result.output_files[0];
    assert_eq!(file.path, project.path("build/index.cjs"));
    assert!(!file.text.contains(ESM_COMPATIBILITY_PREAMBLE));
    assert!(file.text.contains("goodbye"));
    assert!(file.text.contains("module.exports"));
    assert!(!file.text.contains("require(\"test-cjs-module\")"));
}

#[tokio::test]
async fn test_node_builtins_stay_external() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { join } from 'node:path';\nexport const where = join('a', 'b');\n",
    );

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let result = compile(&options).await.unwrap();

    assert!(result.output_files[0].text.contains("\"node:path\""));
}

#[tokio::test]
async fn test_bundle_minify_shrinks_output() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { thing } from './thing';\nexport function describe(value: string): string {\n    const prefix = 'value: ';\n    return prefix + value + thing;\n}\n",
    );
    project.write("src/thing.ts", "export const thing = '!';\n");

    let plain = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let minified = plain.clone().with_minify(true);

    let plain = compile(&plain).await.unwrap();
    let minified = compile(&minified).await.unwrap();

    assert!(minified.output_files[0].text.len() < plain.output_files[0].text.len());
}

#[tokio::test]
async fn test_bundle_inline_source_map() {
    let project = Project::new();
    project.write("src/index.ts", "export const hello = 'world';\n");

    let options = project
        .options(OutputIntent::Module)
        .with_bundle("index.ts", "index.mjs")
        .with_source_map(true);
    let result = compile(&options).await.unwrap();

    assert!(result.output_files[0]
        .text
        .contains("//# sourceMappingURL=data:application/json;base64,"));
}

#[tokio::test]
async fn test_bundle_source_map_comments_in_packages_are_neutralised() {
    let project = Project::with_packages();
    project.write(
        "node_modules/test-esm-module/index.js",
        "export const hello = 'world';\n//# sourceMappingURL=index.js.map\n",
    );
    project.write(
        "src/index.ts",
        "import { hello } from 'test-esm-module';\nexport const greeting = hello;\n",
    );

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");

    // The missing map file would be a warning without the suppression plugin.
    assert!(compile(&options).await.is_ok());
}

#[tokio::test]
async fn test_unresolved_package_fails_bundle() {
    let project = Project::new();
    // Installed but without a runtime entry: the checker accepts it, the bundler cannot load it.
    project.write("node_modules/ghost/package.json", r#"{"name": "ghost"}"#);
    project.write(
        "src/index.ts",
        "import { value } from 'ghost';\nexport const hello = value;\n",
    );

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let err = compile(&options).await.unwrap_err();

    assert!(matches!(err, BuilderError::Bundle { .. }));
    assert!(err.to_string().starts_with("bundle failed ["));
    assert_eq!(
        err.messages(),
        ["bundle error: src/index.ts: Could not resolve \"ghost\"".to_string()]
    );
}
