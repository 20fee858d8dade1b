//! Archive materializer: builds each metadata archive exactly once.
//!
//! The artifact path `<repository_root>/<cell id>/<version>meta<suffix>` is
//! the only idempotency signal: if it exists the archive is reused as-is.
//! Otherwise the archive is assembled in a cell-private scratch directory,
//! packed by the external archiver, and published with a copy + rename so a
//! failed or killed build never leaves a truncated file at the artifact path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::fs;
use tokio::process::Command;

use ifwrepo_core::types::INSTALL_SCRIPT_NAME;
use ifwrepo_core::{CellId, Config, PackerConfig};

use crate::error::{io_err, SyncError};
use crate::writer;

// ---------------------------------------------------------------------------
// Packer
// ---------------------------------------------------------------------------

/// The external archiver, run as `<program> a <output> <input dir>`.
#[derive(Debug, Clone)]
pub struct Packer {
    program: PathBuf,
    timeout: Duration,
}

impl Packer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Packer {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PackerConfig) -> Self {
        Packer::new(&config.program, config.timeout())
    }

    /// Pack `input` (a directory under `workdir`) into `workdir/<output>`.
    ///
    /// The child is killed if the timeout elapses. No retry.
    pub async fn pack(
        &self,
        cell: &CellId,
        workdir: &Path,
        output: &str,
        input: &str,
    ) -> Result<(), SyncError> {
        let packer_err = |reason: String| SyncError::Packer {
            cell: cell.clone(),
            reason,
        };

        let child = Command::new(&self.program)
            .arg("a")
            .arg(output)
            .arg(input)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| packer_err(format!("cannot launch {}: {e}", self.program.display())))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| packer_err(format!("waiting for packer: {e}")))?,
            Err(_) => {
                return Err(SyncError::Timeout {
                    operation: format!("packer for {cell}"),
                    after: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(packer_err(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Materializer
// ---------------------------------------------------------------------------

/// Files copied into every archive.
#[derive(Debug, Clone)]
pub struct StagingFiles {
    pub license: PathBuf,
    /// Copied in as `installscript.qs`.
    pub script: PathBuf,
}

/// Result of [`Materializer::materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// Built in this run.
    Built(PathBuf),
    /// Already present from an earlier run; untouched.
    Reused(PathBuf),
}

impl Materialized {
    pub fn path(&self) -> &Path {
        match self {
            Materialized::Built(p) | Materialized::Reused(p) => p,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Materialized::Built(_))
    }
}

/// Produces metadata archives under the repository root.
#[derive(Debug, Clone)]
pub struct Materializer {
    repository_root: PathBuf,
    scratch_root: PathBuf,
    archive_suffix: String,
    packer: Packer,
}

impl Materializer {
    pub fn new(
        repository_root: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
        archive_suffix: impl Into<String>,
        packer: Packer,
    ) -> Self {
        Materializer {
            repository_root: repository_root.into(),
            scratch_root: scratch_root.into(),
            archive_suffix: archive_suffix.into(),
            packer,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Materializer::new(
            &config.repository_root,
            &config.scratch_root,
            &config.archive_suffix,
            Packer::from_config(&config.packer),
        )
    }

    /// `<repository_root>/<cell>/<version>meta<suffix>`
    pub fn artifact_path(&self, cell: &CellId, version: &str) -> PathBuf {
        self.repository_root
            .join(&cell.0)
            .join(format!("{version}meta{}", self.archive_suffix))
    }

    /// Scratch directory private to `cell`.
    pub fn scratch_dir(&self, cell: &CellId) -> PathBuf {
        self.scratch_root.join(&cell.0)
    }

    /// Return the artifact for `(cell, version)`, building it if absent.
    pub async fn materialize(
        &self,
        cell: &CellId,
        version: &str,
        staging: &StagingFiles,
    ) -> Result<Materialized, SyncError> {
        let target = self.artifact_path(cell, version);
        if fs::try_exists(&target).await.map_err(|e| io_err(&target, e))? {
            tracing::debug!(%cell, version, "metadata already exists, skipping build");
            return Ok(Materialized::Reused(target));
        }

        tracing::info!(%cell, version, "building release metadata");
        let scratch = self.scratch_dir(cell);
        let result = self.build(cell, &scratch, &target, staging).await;

        // Always clear the scratch dir so partial state never survives a run.
        if let Err(err) = writer::remove_dir_if_exists(&scratch).await {
            tracing::warn!(%cell, error = %err, "failed to remove scratch directory");
        }

        result?;
        tracing::debug!(%cell, path = %target.display(), "metadata published");
        Ok(Materialized::Built(target))
    }

    async fn build(
        &self,
        cell: &CellId,
        scratch: &Path,
        target: &Path,
        staging: &StagingFiles,
    ) -> Result<(), SyncError> {
        writer::remove_dir_if_exists(scratch).await?;

        // The archive must contain a top-level directory named after the package.
        let input_dir = scratch.join(&cell.0);
        fs::create_dir_all(&input_dir)
            .await
            .map_err(|e| io_err(&input_dir, e))?;

        let license_name = staging
            .license
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("license.txt"));
        copy_into(&staging.license, &input_dir.join(license_name)).await?;
        copy_into(&staging.script, &input_dir.join(INSTALL_SCRIPT_NAME)).await?;

        let packed_name = format!("meta{}", self.archive_suffix);
        self.packer.pack(cell, scratch, &packed_name, &cell.0).await?;

        let packed = scratch.join(&packed_name);
        if !fs::try_exists(&packed).await.map_err(|e| io_err(&packed, e))? {
            return Err(SyncError::Packer {
                cell: cell.clone(),
                reason: format!("reported success but {} was not produced", packed.display()),
            });
        }

        writer::remove_file_if_exists(&writer::tmp_path_for(target)).await?;
        writer::publish_file(&packed, target).await
    }
}

async fn copy_into(src: &Path, dest: &Path) -> Result<(), SyncError> {
    fs::copy(src, dest).await.map_err(|e| io_err(src, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
