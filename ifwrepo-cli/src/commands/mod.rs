pub mod sync;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ifwrepo_core::Config;

/// `--config` shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the repository configuration.
    #[arg(long, short = 'c', default_value = "ifwrepo.yaml")]
    pub config: PathBuf,
}

impl ConfigArg {
    pub fn load(&self) -> Result<Config> {
        Config::load(&self.config)
            .with_context(|| format!("failed to load config {}", self.config.display()))
    }
}
