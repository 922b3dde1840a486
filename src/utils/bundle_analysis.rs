// Size breakdown of bundle artifacts from the metafile

use crate::core::models::Metafile;
use serde::{Deserialize, Serialize};

const THIRD_PARTY_MARKER: &str = "node_modules";

/// Bytes each partition contributes to the written artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAnalysis {
    /// Local source inlined into the outputs.
    pub source_bytes: usize,
    /// Third-party code inlined from `node_modules`.
    pub module_bytes: usize,
    /// Full size of every output, banner and runtime included.
    pub total_bytes: usize,
}

impl BundleAnalysis {
    pub fn analyze(metafile: &Metafile) -> Self {
        let mut analysis = BundleAnalysis::default();

        for output in metafile.outputs.values() {
            for (input, contribution) in &output.inputs {
                if input.contains(THIRD_PARTY_MARKER) {
                    analysis.module_bytes += contribution.bytes_in_output;
                } else {
                    analysis.source_bytes += contribution.bytes_in_output;
                }
            }
            analysis.total_bytes += output.bytes;
        }

        analysis
    }

    /// One-line summary logged after a bundle is written.
    pub fn summary(&self, out_file: &str) -> String {
        format!(
            "{}: src {}, node_modules {}, total {}",
            out_file, self.source_bytes, self.module_bytes, self.total_bytes
        )
    }
}

/// Free-function form used by the CLI.
pub fn analyze(metafile: &Metafile) -> BundleAnalysis {
    BundleAnalysis::analyze(metafile)
}
