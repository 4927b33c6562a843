use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};

pub const SCRIPT_FILE: &str = "script.js";
pub const RESULTS_FILE: &str = "results.json";

/// Per-run directory holding the generated script and the summary export.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub dir: PathBuf,
    pub script_path: PathBuf,
    pub results_path: PathBuf,
}

impl Workspace {
    /// Create `base_dir/run_id`.
    pub async fn prepare(base_dir: &Path, run_id: &str) -> RunnerResult<Self> {
        let dir = base_dir.join(run_id);

        fs::create_dir_all(&dir).await.map_err(|e| {
            RunnerError::WorkspaceIo(format!(
                "Failed to create workspace {}: {}",
                dir.display(),
                e
            ))
        })?;

        debug!("Workspace created at {}", dir.display());

        Ok(Self {
            script_path: dir.join(SCRIPT_FILE),
            results_path: dir.join(RESULTS_FILE),
            dir,
        })
    }

    pub async fn write_script(&self, content: &str) -> RunnerResult<()> {
        fs::write(&self.script_path, content).await.map_err(|e| {
            RunnerError::WorkspaceIo(format!(
                "Failed to write script {}: {}",
                self.script_path.display(),
                e
            ))
        })?;

        info!("Script written to {}", self.script_path.display());
        Ok(())
    }

    /// Read the summary export, `None` when the runner did not produce one.
    pub async fn read_results(&self) -> RunnerResult<Option<String>> {
        match fs::read_to_string(&self.results_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RunnerError::WorkspaceIo(format!(
                "Failed to read results {}: {}",
                self.results_path.display(),
                e
            ))),
        }
    }

    /// Best-effort recursive delete; failures are only logged.
    pub async fn teardown(&self) {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => info!("Workspace {} deleted", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete workspace {}: {}", self.dir.display(), e),
        }
    }
}
