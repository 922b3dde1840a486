// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use ts_builder::core::models::{CompileOptions, OutputIntent};

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// A project with the two fixture packages under `node_modules`.
    pub fn with_packages() -> Self {
        let project = Self::new();
        project.write(
            "node_modules/test-esm-module/package.json",
            r#"{"name": "test-esm-module", "type": "module"}"#,
        );
        project.write(
            "node_modules/test-esm-module/index.js",
            "export const hello = 'world';\n",
        );
        project.write(
            "node_modules/test-cjs-module/package.json",
            r#"{"name": "test-cjs-module"}"#,
        );
        project.write(
            "node_modules/test-cjs-module/index.js",
            "module.exports.goodbye = 'world';\n",
        );
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn options(&self, intent: OutputIntent) -> CompileOptions {
        CompileOptions::new(intent, "src".into(), "build".into())
            .with_working_directory(self.root())
    }
}
