//! `ifwrepo sync`: bring the update repository up to date.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use ifwrepo_sync::{CellOutcome, GithubSource, ManifestOutcome, Orchestrator, RunMode, SyncReport};

use super::ConfigArg;
use crate::logging;

/// Arguments for `ifwrepo sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Resolve every cell and report what would happen without building or writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Also append logs to this file; overrides `log_file` from the config.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let log_file = self.log_file.clone().or_else(|| config.log_file.clone());
        logging::init(self.verbose, log_file.as_deref())?;

        let source = GithubSource::new(&config.source);
        if let Some(var) = config.source.token_env.as_deref() {
            if !source.has_token() {
                tracing::warn!(env = var, "token variable unset, using anonymous access");
            }
        }

        let mode = if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Apply
        };
        let orchestrator =
            Orchestrator::new(config, source).context("failed to load manifest template")?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let report = runtime
            .block_on(orchestrator.run(mode))
            .context("sync failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
        } else {
            print_report(&report);
        }

        if report.has_failures() {
            bail!(
                "{} of {} cells failed",
                report.counts.failed,
                report.cells.len()
            );
        }
        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    let prefix = if report.manifest == ManifestOutcome::DryRun {
        "[dry-run] "
    } else {
        ""
    };

    for cell in &report.cells {
        let id = &cell.cell;
        match &cell.outcome {
            CellOutcome::Built { version, .. } => {
                println!("  {}  {id} {}", "✎".green(), format!("built {version}").green())
            }
            CellOutcome::Reused { version, .. } => println!("  ·  {id} {version}"),
            CellOutcome::WouldBuild { version } => {
                println!("  {}  {id} would build {version}", "~".cyan())
            }
            CellOutcome::WouldReuse { version } => println!("  ·  {id} {version}"),
            CellOutcome::Skipped { reason } => {
                println!("  {}  {id} {}", "-".yellow(), reason.yellow())
            }
            CellOutcome::Failed { reason } => {
                println!("  {}  {id} {}", "✗".red().bold(), reason.red())
            }
        }
    }

    let c = &report.counts;
    match &report.manifest {
        ManifestOutcome::Published { path, packages } => println!(
            "{prefix}{} published {} ({packages} packages; {} built, {} reused, {} skipped, {} failed)",
            "✓".green().bold(),
            path.display(),
            c.built,
            c.reused,
            c.skipped,
            c.failed,
        ),
        ManifestOutcome::NothingToDo => println!(
            "{prefix}{} nothing to do ({} reused, {} skipped, {} failed)",
            "✓".green().bold(),
            c.reused,
            c.skipped,
            c.failed,
        ),
        ManifestOutcome::DryRun => println!(
            "{prefix}{} to build, {} up to date, {} skipped, {} failed",
            c.would_build, c.would_reuse, c.skipped, c.failed,
        ),
    }
}
