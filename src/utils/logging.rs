use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Logger;

impl Logger {
    /// Install the global subscriber. Only the CLI calls this; library users bring their own.
    pub fn init() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ts_builder=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn compile_start(intent: &str, source_dir: &str, output_dir: &str) {
        info!("🔨 Compiling {} -> {} ({})", source_dir, output_dir, intent);
    }

    pub fn found_files(count: usize) {
        debug!("📁 Found {} TypeScript files", count);
    }

    pub fn type_check_start(checker: &str, files: usize) {
        debug!("🔍 {}: checking {} root files", checker, files);
    }

    pub fn type_check_complete(checker: &str, diagnostics: usize) {
        if diagnostics == 0 {
            debug!("✅ {}: no diagnostics", checker);
        } else {
            warn!("⚠️  {}: {} diagnostics", checker, diagnostics);
        }
    }

    pub fn bundle_start(bundler: &str, entry_points: usize, bundle: bool) {
        let mode = if bundle { "bundle" } else { "per-file" };
        debug!("📦 {}: {} entry points ({})", bundler, entry_points, mode);
    }

    pub fn bundle_complete(bundler: &str, outputs: usize) {
        debug!("✅ {}: produced {} files", bundler, outputs);
    }

    pub fn processing_module(path: &str) {
        debug!("⚡ Processing: {}", path);
    }

    pub fn wrote_file(path: &str, bytes: usize) {
        debug!("💾 {} ({} bytes)", path, bytes);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
