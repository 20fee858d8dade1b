//! `ifwrepo validate`: config sanity plus presence of every staged file.

use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ifwrepo_core::Config;

use super::ConfigArg;

/// Arguments for `ifwrepo validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Tabled)]
struct CellRow {
    #[tabled(rename = "package")]
    package: String,
    #[tabled(rename = "platform")]
    platform: String,
    #[tabled(rename = "upstream")]
    repo: String,
    #[tabled(rename = "script")]
    script: String,
    #[tabled(rename = "status")]
    status: String,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let (rows, mut missing) = matrix(&config)?;

        println!(
            "ifwrepo v{} | {} platforms | {} families | {} cells",
            env!("CARGO_PKG_VERSION"),
            config.platforms.len(),
            config.families.len(),
            rows.len(),
        );
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if !config.license_file.is_file() {
            println!(
                "{} license file {} is missing",
                "✗".red().bold(),
                config.license_file.display()
            );
            missing += 1;
        }

        if missing > 0 {
            bail!("{missing} required file(s) missing");
        }
        println!("{} configuration OK", "✓".green().bold());
        Ok(())
    }
}

fn matrix(config: &Config) -> Result<(Vec<CellRow>, usize)> {
    let mut missing = 0;
    let mut rows = Vec::new();
    for cell in config.cells()? {
        let script = config.script_path(&cell.family, &cell.platform);
        let present = script.is_file();
        if !present {
            missing += 1;
        }
        rows.push(CellRow {
            package: cell.id.to_string(),
            platform: cell.platform.to_string(),
            repo: cell.family.repo.clone(),
            script: display_relative(&script, &config.assets_dir),
            status: if present { "ok" } else { "missing" }.to_string(),
        });
    }
    Ok((rows, missing))
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}
