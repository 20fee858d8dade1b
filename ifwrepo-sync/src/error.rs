//! Error types for ifwrepo-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use ifwrepo_core::{CellId, ConfigError, TemplateError};
use ifwrepo_renderer::RenderError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The upstream release listing could not be fetched.
    #[error("fetching releases for {repo} failed: {reason}")]
    Fetch { repo: String, reason: String },

    /// The upstream answered with something that is not a release list.
    #[error("malformed release listing for {repo}: {source}")]
    MalformedReleases {
        repo: String,
        #[source]
        source: serde_json::Error,
    },

    /// A release tag without the `<name>-<version>` shape.
    #[error("release tag '{tag}' has no version segment")]
    MalformedTag { tag: String },

    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The archiver could not be launched or reported failure.
    #[error("packer failed for {cell}: {reason}")]
    Packer { cell: CellId, reason: String },

    /// A family template could not be applied.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// An error from the manifest renderer.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// An error from configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A spawned task panicked or was cancelled.
    #[error("task join error: {0}")]
    Join(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
