//! # ifwrepo-sync
//!
//! Mirrors upstream releases into an installer-framework update repository.
//!
//! Build an [`Orchestrator`] from a loaded [`ifwrepo_core::Config`] and a
//! [`ReleaseSource`] (normally [`GithubSource`]), then call
//! [`Orchestrator::run`]. Each platform × family cell gets its metadata
//! archive built once; `Updates.xml` is rewritten only when a new archive
//! appeared.

pub mod aggregator;
pub mod error;
pub mod materializer;
pub mod orchestrator;
pub mod resolver;
pub mod source;
pub mod writer;

pub use aggregator::ManifestAggregator;
pub use error::SyncError;
pub use materializer::{Materialized, Materializer, Packer, StagingFiles};
pub use orchestrator::{
    CellOutcome, CellReport, ManifestOutcome, Orchestrator, OutcomeCounts, RunMode, SyncReport,
};
pub use resolver::{CellResolver, Plan, Resolution};
pub use source::{select_asset, GithubSource, ReleaseSource, UpstreamAsset, UpstreamRelease};
