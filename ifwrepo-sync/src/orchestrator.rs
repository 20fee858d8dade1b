//! Sync orchestrator: fetch, fan out one task per cell, barrier, publish.
//!
//! ## Run sequence
//!
//! 1. Reset the scratch root (apply mode only).
//! 2. Fetch every distinct upstream repo concurrently, each on the blocking
//!    pool under the source timeout.
//! 3. Spawn one task per cell, platform-major, optionally capped by
//!    `max_parallel`.
//! 4. Await every task. A panicking task becomes a failed cell.
//! 5. Publish `Updates.xml` only if some cell built a new archive.
//!
//! Cell-level problems end up in the [`SyncReport`]; only a scratch reset or
//! manifest write failure makes [`Orchestrator::run`] return `Err`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use ifwrepo_core::{Cell, CellId, Config, PlatformTag};
use ifwrepo_renderer::ManifestRenderer;

use crate::aggregator::ManifestAggregator;
use crate::error::{io_err, SyncError};
use crate::resolver::{CellResolver, Plan, Resolution};
use crate::source::{ReleaseSource, UpstreamRelease};
use crate::writer;

/// Whether a run may touch the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Apply,
    /// Fetch and resolve only: no packer, no writes, scratch untouched.
    DryRun,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What happened to one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    Built { version: String, sha: String },
    Reused { version: String, sha: String },
    Skipped { reason: String },
    Failed { reason: String },
    WouldBuild { version: String },
    WouldReuse { version: String },
}

impl CellOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CellOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellReport {
    pub cell: CellId,
    pub platform: PlatformTag,
    pub outcome: CellOutcome,
}

/// What happened to `Updates.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManifestOutcome {
    Published { path: PathBuf, packages: usize },
    NothingToDo,
    DryRun,
}

/// Per-status cell counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub built: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
    pub would_build: usize,
    pub would_reuse: usize,
}

/// Result of one [`Orchestrator::run`], in matrix order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub cells: Vec<CellReport>,
    pub manifest: ManifestOutcome,
    pub counts: OutcomeCounts,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(cells: Vec<CellReport>, manifest: ManifestOutcome, elapsed: Duration) -> Self {
        let mut counts = OutcomeCounts::default();
        for report in &cells {
            let slot = match report.outcome {
                CellOutcome::Built { .. } => &mut counts.built,
                CellOutcome::Reused { .. } => &mut counts.reused,
                CellOutcome::Skipped { .. } => &mut counts.skipped,
                CellOutcome::Failed { .. } => &mut counts.failed,
                CellOutcome::WouldBuild { .. } => &mut counts.would_build,
                CellOutcome::WouldReuse { .. } => &mut counts.would_reuse,
            };
            *slot += 1;
        }
        SyncReport {
            cells,
            manifest,
            counts,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    pub fn outcome_of(&self, cell: &str) -> Option<&CellOutcome> {
        self.cells
            .iter()
            .find(|r| r.cell.0 == cell)
            .map(|r| &r.outcome)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

type FetchResults = HashMap<String, Result<Arc<Vec<UpstreamRelease>>, String>>;

enum Pending {
    Running(JoinHandle<CellOutcome>),
    Done(CellOutcome),
}

pub struct Orchestrator<S: ReleaseSource> {
    config: Arc<Config>,
    source: Arc<S>,
    resolver: Arc<CellResolver>,
    renderer: ManifestRenderer,
}

impl<S: ReleaseSource> Orchestrator<S> {
    /// Fails only if a user manifest template exists and does not parse.
    pub fn new(config: Config, source: S) -> Result<Self, SyncError> {
        let config = Arc::new(config);
        let renderer = ManifestRenderer::with_template_dir(config.template_dir.as_deref())?;
        Ok(Orchestrator {
            resolver: Arc::new(CellResolver::new(Arc::clone(&config))),
            source: Arc::new(source),
            config,
            renderer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, mode: RunMode) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let cells = self.config.cells()?;
        tracing::info!(cells = cells.len(), ?mode, "starting sync");

        if mode == RunMode::Apply {
            self.reset_scratch().await?;
        }

        let fetched = self.fetch_all().await;

        let aggregator = Arc::new(ManifestAggregator::new(self.config.application.clone()));
        let semaphore = self.config.max_parallel.map(|n| Arc::new(Semaphore::new(n)));

        let mut pending = Vec::with_capacity(cells.len());
        for cell in cells {
            let state = match fetched.get(&cell.family.repo) {
                Some(Ok(releases)) => Pending::Running(tokio::spawn(run_cell(
                    Arc::clone(&self.resolver),
                    Arc::clone(&aggregator),
                    semaphore.clone(),
                    cell.clone(),
                    Arc::clone(releases),
                    mode,
                ))),
                Some(Err(reason)) => {
                    tracing::error!(cell = %cell.id, %reason, "release list unavailable, cell failed");
                    Pending::Done(CellOutcome::Failed {
                        reason: format!("release fetch failed: {reason}"),
                    })
                }
                None => Pending::Done(CellOutcome::Failed {
                    reason: "release list was never fetched".into(),
                }),
            };
            pending.push((cell, state));
        }

        // Barrier: every cell settles before the manifest is considered.
        let mut reports = Vec::with_capacity(pending.len());
        for (cell, state) in pending {
            let outcome = match state {
                Pending::Done(outcome) => outcome,
                Pending::Running(handle) => handle.await.unwrap_or_else(|e| {
                    let err = SyncError::Join(e.to_string());
                    tracing::error!(cell = %cell.id, error = %err, "cell task aborted");
                    CellOutcome::Failed {
                        reason: err.to_string(),
                    }
                }),
            };
            reports.push(CellReport {
                cell: cell.id,
                platform: cell.platform,
                outcome,
            });
        }

        let manifest = match mode {
            RunMode::DryRun => ManifestOutcome::DryRun,
            RunMode::Apply => self.publish(&aggregator).await?,
        };

        let report = SyncReport::new(reports, manifest, started.elapsed());
        tracing::info!(
            built = report.counts.built,
            reused = report.counts.reused,
            skipped = report.counts.skipped,
            failed = report.counts.failed,
            duration_ms = report.duration_ms,
            "sync finished"
        );
        Ok(report)
    }

    async fn reset_scratch(&self) -> Result<(), SyncError> {
        let scratch = &self.config.scratch_root;
        writer::remove_dir_if_exists(scratch).await?;
        tokio::fs::create_dir_all(scratch)
            .await
            .map_err(|e| io_err(scratch, e))
    }

    /// One fetch per distinct repo, all in flight at once.
    async fn fetch_all(&self) -> FetchResults {
        let timeout = self.config.source.timeout();
        let mut repos: Vec<&str> = Vec::new();
        for family in &self.config.families {
            if !repos.contains(&family.repo.as_str()) {
                repos.push(&family.repo);
            }
        }

        let handles: Vec<_> = repos
            .into_iter()
            .map(|repo| {
                let repo = repo.to_owned();
                let source = Arc::clone(&self.source);
                let handle = tokio::spawn(fetch_one(source, repo.clone(), timeout));
                (repo, handle)
            })
            .collect();

        let mut results = FetchResults::new();
        for (repo, handle) in handles {
            let result = match handle.await {
                Ok(Ok(releases)) => {
                    tracing::debug!(%repo, releases = releases.len(), "release list fetched");
                    Ok(Arc::new(releases))
                }
                Ok(Err(err)) => {
                    tracing::error!(%repo, error = %err, "failed to fetch releases");
                    Err(err.to_string())
                }
                Err(e) => Err(SyncError::Join(e.to_string()).to_string()),
            };
            results.insert(repo, result);
        }
        results
    }

    async fn publish(&self, aggregator: &ManifestAggregator) -> Result<ManifestOutcome, SyncError> {
        if !aggregator.has_new_work() {
            tracing::info!("nothing to do");
            return Ok(ManifestOutcome::NothingToDo);
        }
        let xml = aggregator.render(&self.renderer)?;
        let path = self.config.manifest_path();
        writer::atomic_write(&path, xml.as_bytes()).await?;
        let packages = aggregator.len();
        tracing::info!(path = %path.display(), packages, "manifest published");
        Ok(ManifestOutcome::Published { path, packages })
    }
}

async fn fetch_one<S: ReleaseSource>(
    source: Arc<S>,
    repo: String,
    timeout: Duration,
) -> Result<Vec<UpstreamRelease>, SyncError> {
    let blocking_repo = repo.clone();
    let task = tokio::task::spawn_blocking(move || source.fetch_releases(&blocking_repo));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(SyncError::Join(e.to_string())),
        Err(_) => Err(SyncError::Timeout {
            operation: format!("fetching releases for {repo}"),
            after: timeout,
        }),
    }
}

async fn run_cell(
    resolver: Arc<CellResolver>,
    aggregator: Arc<ManifestAggregator>,
    semaphore: Option<Arc<Semaphore>>,
    cell: Cell,
    releases: Arc<Vec<UpstreamRelease>>,
    mode: RunMode,
) -> CellOutcome {
    let _permit = match semaphore {
        Some(sem) => match sem.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                return CellOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        },
        None => None,
    };

    let outcome = match mode {
        RunMode::Apply => apply_cell(&resolver, &aggregator, &cell, &releases).await,
        RunMode::DryRun => plan_cell(&resolver, &cell, &releases).await,
    };
    outcome.unwrap_or_else(|err| {
        tracing::error!(cell = %cell.id, error = %err, "cell failed");
        CellOutcome::Failed {
            reason: err.to_string(),
        }
    })
}

async fn apply_cell(
    resolver: &CellResolver,
    aggregator: &ManifestAggregator,
    cell: &Cell,
    releases: &[UpstreamRelease],
) -> Result<CellOutcome, SyncError> {
    match resolver.resolve(cell, releases).await? {
        Resolution::Skip => Ok(skipped(cell)),
        Resolution::Package {
            descriptor,
            artifact,
        } => {
            let version = descriptor.version.clone();
            let sha = descriptor.sha.clone();
            let is_new = artifact.is_new();
            aggregator.add(descriptor, is_new);
            Ok(if is_new {
                CellOutcome::Built { version, sha }
            } else {
                CellOutcome::Reused { version, sha }
            })
        }
    }
}

async fn plan_cell(
    resolver: &CellResolver,
    cell: &Cell,
    releases: &[UpstreamRelease],
) -> Result<CellOutcome, SyncError> {
    Ok(match resolver.plan(cell, releases).await? {
        Plan::Skip => skipped(cell),
        Plan::Build(release) => CellOutcome::WouldBuild {
            version: release.version,
        },
        Plan::Reuse(release) => CellOutcome::WouldReuse {
            version: release.version,
        },
    })
}

fn skipped(cell: &Cell) -> CellOutcome {
    CellOutcome::Skipped {
        reason: format!("no release asset for platform '{}'", cell.platform),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<CellOutcome>) -> SyncReport {
        let cells = outcomes
            .into_iter()
            .enumerate()
            .map(|(i, outcome)| CellReport {
                cell: CellId(format!("cell{i}")),
                platform: PlatformTag::from("linux"),
                outcome,
            })
            .collect();
        SyncReport::new(cells, ManifestOutcome::NothingToDo, Duration::from_millis(12))
    }

    #[test]
    fn counts_and_failure_flag() {
        let r = report(vec![
            CellOutcome::Built {
                version: "1".into(),
                sha: "a".into(),
            },
            CellOutcome::Skipped { reason: "x".into() },
            CellOutcome::Skipped { reason: "y".into() },
        ]);
        assert_eq!(r.counts.built, 1);
        assert_eq!(r.counts.skipped, 2);
        assert!(!r.has_failures());
        assert_eq!(r.duration_ms, 12);

        let r = report(vec![CellOutcome::Failed { reason: "boom".into() }]);
        assert!(r.has_failures());
        assert!(r.outcome_of("cell0").unwrap().is_failure());
        assert!(r.outcome_of("nope").is_none());
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let r = report(vec![CellOutcome::WouldBuild {
            version: "42".into(),
        }]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["cells"][0]["outcome"]["status"], "would_build");
        assert_eq!(json["cells"][0]["outcome"]["version"], "42");
        assert_eq!(json["cells"][0]["cell"], "cell0");
        assert_eq!(json["manifest"]["status"], "nothing_to_do");
        assert_eq!(json["counts"]["would_build"], 1);
    }
}
