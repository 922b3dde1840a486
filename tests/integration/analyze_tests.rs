mod common;

use common::Project;
use ts_builder::cli::{Cli, CliHandler, METAFILE_NAME};
use ts_builder::core::models::{Metafile, OutputIntent};
use ts_builder::utils::{analyze, BuilderError};
use ts_builder::compile;

fn bundle_cli(external: Vec<String>) -> Cli {
    Cli {
        entry_point: Some("index.ts".into()),
        out_file: Some("index.mjs".into()),
        external,
        ..Default::default()
    }
}

fn read_metafile(project: &Project) -> Metafile {
    let text = std::fs::read_to_string(project.path("build").join(METAFILE_NAME)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn write_entry(project: &Project) {
    project.write(
        "src/index.ts",
        "import { hello } from 'test-esm-module';\nexport const greeting = hello;\n",
    );
}

#[tokio::test]
async fn test_excluded_packages_contribute_no_module_bytes() {
    let project = Project::with_packages();
    write_entry(&project);

    CliHandler::new()
        .execute(&bundle_cli(vec!["*".to_string()]), project.root())
        .await
        .unwrap();

    let bundle = std::fs::read_to_string(project.path("build/index.mjs")).unwrap();
    assert!(bundle.contains("from \"test-esm-module\""));

    let analysis = analyze(&read_metafile(&project));
    assert_eq!(analysis.module_bytes, 0);
    assert!(analysis.source_bytes > 0);
    // The banner is counted in the total but belongs to no input.
    assert!(analysis.total_bytes > analysis.source_bytes + analysis.module_bytes);
}

#[tokio::test]
async fn test_inlined_packages_count_as_module_bytes() {
    let project = Project::with_packages();
    write_entry(&project);

    CliHandler::new()
        .execute(&bundle_cli(Vec::new()), project.root())
        .await
        .unwrap();

    let analysis = analyze(&read_metafile(&project));
    assert!(analysis.module_bytes > 0);
    assert!(analysis.source_bytes > 0);
    assert!(analysis.total_bytes > analysis.source_bytes + analysis.module_bytes);
}

#[tokio::test]
async fn test_per_file_build_writes_no_metafile() {
    let project = Project::new();
    project.write("src/index.ts", "export const hello = 'world';\n");

    CliHandler::new()
        .execute(&Cli::default(), project.root())
        .await
        .unwrap();

    assert!(project.path("build/index.mjs").is_file());
    assert!(!project.path("build").join(METAFILE_NAME).exists());
}

#[tokio::test]
async fn test_config_file_is_merged_under_flags() {
    let project = Project::new();
    project.write("lib/index.ts", "export const hello = 'world';\n");
    project.write(
        "builder.config.json",
        r#"{"inDir": "lib", "outDir": "dist", "type": "types"}"#,
    );

    let cli = Cli {
        output_type: Some("commonjs".to_string()),
        ..Default::default()
    };
    CliHandler::new().execute(&cli, project.root()).await.unwrap();

    assert!(project.path("dist/index.cjs").is_file());
    assert!(!project.path("dist/index.d.ts").exists());
}

#[tokio::test]
async fn test_compile_metafile_matches_analysis() {
    let project = Project::with_packages();
    write_entry(&project);

    let options = project.options(OutputIntent::Module).with_bundle("index.ts", "index.mjs");
    let result = compile(&options).await.unwrap();
    let metafile = result.metafile.unwrap();

    let analysis = analyze(&metafile);
    let output = &metafile.outputs["build/index.mjs"];
    assert_eq!(analysis.total_bytes, output.bytes);
    assert_eq!(
        analysis.source_bytes,
        output.inputs["src/index.ts"].bytes_in_output
    );
}

#[tokio::test]
async fn test_unknown_type_is_rejected() {
    let project = Project::new();
    let cli = Cli {
        output_type: Some("amd".to_string()),
        ..Default::default()
    };

    let err = CliHandler::new().execute(&cli, project.root()).await.unwrap_err();
    assert!(matches!(err, BuilderError::Config(_)));
}
