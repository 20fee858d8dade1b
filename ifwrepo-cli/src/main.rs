//! ifwrepo: mirror upstream release builds into an installer-framework
//! update repository.
//!
//! # Usage
//!
//! ```text
//! ifwrepo sync [--config ifwrepo.yaml] [--dry-run] [--json] [--verbose] [--log-file <path>]
//! ifwrepo validate [--config ifwrepo.yaml]
//! ```

mod commands;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{sync::SyncArgs, validate::ValidateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ifwrepo",
    version,
    about = "Keep an installer-framework update repository in step with upstream releases",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build missing metadata archives and republish Updates.xml if anything changed.
    Sync(SyncArgs),

    /// Check the configuration and the files every cell needs.
    Validate(ValidateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Validate(args) => args.run(),
    }
}
