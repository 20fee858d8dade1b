//! Tracing setup for the binary.
//!
//! Events go to stderr so `--json` output on stdout stays parseable. With a
//! log file, events are also appended there without ANSI colours; the file is
//! rotated at startup once it exceeds 10 MiB, keeping 5 copies:
//!   sync.log → sync.log.1 → … → sync.log.5

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer().with_target(false).with_writer(io::stderr);

    let mut rotated = None;
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            rotated = Some(rotate_if_needed(path, MAX_LOG_BYTES, MAX_ROTATED_FILES));
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if let (Some(path), Some(result)) = (log_file, rotated) {
        match result {
            Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "log rotation failed")
            }
        }
    }
    Ok(())
}

/// Rotate `log_path` if its size is at least `max_bytes`.
///
/// `<name>.<max_files>` is dropped, every other copy shifts up by one and the
/// live file becomes `<name>.1`. Returns `true` if rotation happened; a
/// missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// `sync.log` + 2 → `sync.log.2`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("ifwrepo.log");
    base.with_file_name(format!("{name}.{n}"))
}
