//! Output locations for tests that write files.
//!
//! By default files go to a temporary directory that disappears with the
//! returned guard. Setting `IMSIM_KEEP_TEST_OUTPUT` redirects them into
//! `<workspace>/test_output/<name>` so they can be inspected afterwards.

use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const KEEP_OUTPUT_ENV: &str = "IMSIM_KEEP_TEST_OUTPUT";

#[derive(thiserror::Error, Debug)]
pub enum TestUtilError {
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn find_project_root() -> Result<PathBuf, TestUtilError> {
    let mut current_dir = env::current_dir().map_err(|e| {
        TestUtilError::ProjectRootNotFound(format!("Failed to get current directory: {e}"))
    })?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).map_err(|e| {
                TestUtilError::ProjectRootNotFound(format!("Failed to read Cargo.toml: {e}"))
            })?;

            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }

        if !current_dir.pop() {
            break;
        }
    }

    Err(TestUtilError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

static PROJECT_ROOT: Lazy<Option<PathBuf>> = Lazy::new(|| find_project_root().ok());

/// Directory a test writes into; keeps its temporary backing alive.
pub struct TestOutput {
    path: PathBuf,
    _temp: Option<TempDir>,
}

impl TestOutput {
    /// Output directory for the test called `name`.
    pub fn new(name: &str) -> Result<Self, TestUtilError> {
        let keep = env::var_os(KEEP_OUTPUT_ENV).is_some();
        match (keep, PROJECT_ROOT.as_ref()) {
            (true, Some(root)) => {
                let path = root.join("test_output").join(name);
                create_dir(&path)?;
                Ok(Self { path, _temp: None })
            }
            _ => {
                let temp = tempfile::Builder::new()
                    .prefix(&format!("imsim-{name}-"))
                    .tempdir()
                    .map_err(|source| TestUtilError::OutputDir {
                        path: env::temp_dir(),
                        source,
                    })?;
                Ok(Self {
                    path: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output root for image names, `<dir>/<stem>`.
    pub fn root(&self, stem: &str) -> PathBuf {
        self.path.join(stem)
    }
}

fn create_dir(path: &Path) -> Result<(), TestUtilError> {
    std::fs::create_dir_all(path).map_err(|source| TestUtilError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}
