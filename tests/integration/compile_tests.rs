mod common;

use common::Project;
use ts_builder::core::models::OutputIntent;
use ts_builder::{compile, BuilderError};

#[tokio::test]
async fn test_per_file_module_output() {
    let project = Project::new();
    project.write("src/index.ts", "export const hello = 'world';\n");

    let result = compile(&project.options(OutputIntent::Module)).await.unwrap();

    assert_eq!(result.output_files.len(), 1);
    let file = &result.output_files[0];
    assert_eq!(file.path, project.path("build/index.mjs"));
    assert!(file.text.contains("export const hello = \"world\""));
    assert!(result.metafile.is_none());
}

#[tokio::test]
async fn test_bad_code_reports_every_diagnostic() {
    let project = Project::new();
    project.write("src/index.ts", "bad code");
    let index = project.path("src/index.ts");

    let err = compile(&project.options(OutputIntent::Module)).await.unwrap_err();

    assert!(matches!(err, BuilderError::TypeCheck { .. }));
    let messages = err.messages();
    for (position, text) in [
        ("(1,1)", "Unexpected keyword or identifier."),
        ("(1,1)", "Cannot find name 'bad'."),
        ("(1,5)", "Cannot find name 'code'."),
    ] {
        let expected = format!("typecheck: {} {}: {}", index.display(), position, text);
        assert!(messages.contains(&expected), "{:?} missing from {:?}", expected, messages);
    }
    assert!(!project.path("build").exists());
}

#[tokio::test]
async fn test_per_file_rewrites_relative_imports() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { thing } from './thing';\nexport const hello: string = thing;\n",
    );
    project.write("src/thing.ts", "export const thing = 'world';\n");

    let result = compile(&project.options(OutputIntent::Module)).await.unwrap();

    let mut paths: Vec<_> = result.output_files.iter().map(|f| f.path.clone()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![project.path("build/index.mjs"), project.path("build/thing.mjs")]
    );

    let index = result
        .output_files
        .iter()
        .find(|f| f.path.ends_with("index.mjs"))
        .unwrap();
    assert!(index.text.contains("\"./thing.mjs\""));
    assert!(!index.text.contains(": string"));
}

#[tokio::test]
async fn test_per_file_commonjs_output() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { thing } from './thing';\nexport const hello = thing;\n",
    );
    project.write("src/thing.ts", "export const thing = 'world';\n");

    let result = compile(&project.options(OutputIntent::CommonJs)).await.unwrap();

    assert_eq!(result.output_files.len(), 2);
    let index = result
        .output_files
        .iter()
        .find(|f| f.path == project.path("build/index.cjs"))
        .unwrap();
    assert!(index.text.contains("require(\"./thing.cjs\")"));
    assert!(index.text.contains("module.exports"));
}

#[tokio::test]
async fn test_nested_sources_are_mirrored() {
    let project = Project::new();
    project.write("src/lib/util.ts", "export const util = 1;\n");
    project.write("src/notes.md", "# not compiled\n");

    let result = compile(&project.options(OutputIntent::Module)).await.unwrap();

    assert_eq!(result.output_files.len(), 1);
    assert_eq!(result.output_files[0].path, project.path("build/lib/util.mjs"));
}

#[tokio::test]
async fn test_type_error_stops_the_build() {
    let project = Project::new();
    project.write("src/index.ts", "export const hello = missingName;\n");

    let err = compile(&project.options(OutputIntent::Module)).await.unwrap_err();

    assert!(matches!(err, BuilderError::TypeCheck { .. }));
    assert!(err.to_string().starts_with("typecheck failed ["));
    assert!(err
        .messages()
        .iter()
        .any(|m| m.contains("Cannot find name 'missingName'.")));
    assert!(!project.path("build").exists());
}

#[tokio::test]
async fn test_unused_local_is_reported() {
    let project = Project::new();
    project.write("src/index.ts", "const unused = 1;\nexport const hello = 'world';\n");

    let err = compile(&project.options(OutputIntent::Module)).await.unwrap_err();

    assert!(err
        .messages()
        .iter()
        .any(|m| m.contains("'unused' is declared but its value is never read.")));
}

#[tokio::test]
async fn test_types_only_emits_declarations() {
    let project = Project::new();
    project.write("src/index.ts", "export const hello = 'world';\n");

    let result = compile(&project.options(OutputIntent::TypesOnly)).await.unwrap();

    assert_eq!(result.output_files.len(), 1);
    let file = &result.output_files[0];
    assert_eq!(file.path, project.path("build/index.d.ts"));
    assert!(file.text.contains("export declare const hello = \"world\";"));
    assert!(result.metafile.is_none());
}

#[tokio::test]
async fn test_types_only_accepts_unannotated_exports() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "export function add(a: number, b: number) { return a + b; }\n",
    );

    let result = compile(&project.options(OutputIntent::TypesOnly)).await.unwrap();

    assert_eq!(result.output_files.len(), 1);
    let file = &result.output_files[0];
    assert_eq!(file.path, project.path("build/index.d.ts"));
    assert!(file.text.contains("export declare function add(a: number, b: number)"));
}

#[tokio::test]
async fn test_unused_parameter_is_reported() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "export function f(a: number): number { return 1; }\n",
    );

    let err = compile(&project.options(OutputIntent::Module)).await.unwrap_err();

    assert!(err
        .messages()
        .iter()
        .any(|m| m.ends_with("(1,19): 'a' is declared but its value is never read.")));
}

#[tokio::test]
async fn test_empty_source_directory() {
    let project = Project::new();
    std::fs::create_dir_all(project.path("src")).unwrap();

    let result = compile(&project.options(OutputIntent::Module)).await.unwrap();

    assert!(result.output_files.is_empty());
}

#[tokio::test]
async fn test_missing_source_directory_is_io_error() {
    let project = Project::new();

    let err = compile(&project.options(OutputIntent::Module)).await.unwrap_err();

    assert!(matches!(err, BuilderError::Io(_)));
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let project = Project::new();
    project.write(
        "src/index.ts",
        "import { thing } from './thing';\nexport const hello = thing;\n",
    );
    project.write("src/thing.ts", "export const thing = 'world';\n");

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let first = compile(&options).await.unwrap();
    let second = compile(&options).await.unwrap();

    assert_eq!(first.output_files, second.output_files);
    assert_eq!(first.metafile, second.metafile);
}
