use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::utils::config::PackagePaths;

/// Private per-run directory holding a pipeline's intermediate files.
/// Removed on drop unless [`RunTempDir::keep`] is called.
pub struct RunTempDir {
    dir: TempDir,
}

impl RunTempDir {
    /// Create under `root` when given (created if missing), else under the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PackagePaths::get().temp_prefix());
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)
                    .with_context(|| format!("create temp root {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("create pipeline temp directory")?;
        log::debug!("pipeline temp dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `<tmp>/step-NN/<stem>.<ext>`. One subdirectory per step keeps the original stem intact
    /// so the final output can still be named after the pipeline input.
    pub fn intermediate_path(&self, step_index: usize, stem: &str, ext: &str) -> PathBuf {
        let name = if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{ext}")
        };
        self.dir
            .path()
            .join(format!("step-{:02}", step_index))
            .join(name)
    }

    /// Persist the directory and return its path.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }

    /// Remove the directory and everything in it.
    pub fn remove(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("remove pipeline temp dir {}", path.display()))
    }
}
