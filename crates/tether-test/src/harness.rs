//! Test harness helpers.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Set up test logging with the given filter. Safe to call from every test.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// A temporary host root laid out like a real installation.
#[derive(Debug)]
pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    /// Create a root with empty `plugins`, `plugins-bundled` and
    /// `public/app/plugins/{datasource,panel}` directories.
    ///
    /// # Panics
    ///
    /// Panics if the directories cannot be created.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let dir = TempDir::with_prefix("tether-").expect("failed to create temp directory");
        for sub in [
            "plugins",
            "plugins-bundled",
            "public/app/plugins/datasource",
            "public/app/plugins/panel",
        ] {
            std::fs::create_dir_all(dir.path().join(sub)).expect("failed to create directory");
        }
        Self { dir }
    }

    /// The root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The external-plugins directory.
    #[must_use]
    pub fn plugins(&self) -> PathBuf {
        self.dir.path().join("plugins")
    }
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}
