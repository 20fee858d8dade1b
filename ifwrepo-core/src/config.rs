//! Run configuration loaded once at process start.
//!
//! # Layout on disk
//!
//! ```text
//! <assets_dir>/
//!   license.txt                   (license_file)
//!   scripts/
//!     <platform>-<script>.qs      (one per family × platform)
//! <repository_root>/
//!   Updates.xml                   (published manifest)
//!   <cell id>/
//!     <version>meta.7z            (metadata archive, at most one per version)
//! <scratch_root>/                 (cleared at the start of every run)
//! ```
//!
//! Relative paths in the YAML resolve against the config file's directory.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::template::Placeholder;
use crate::types::{Cell, Family, PlatformTag};

/// File name of the published manifest under the repository root.
pub const MANIFEST_FILE_NAME: &str = "Updates.xml";

// ---------------------------------------------------------------------------
// 1. Structs
// ---------------------------------------------------------------------------

/// Fixed manifest header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationHeader {
    #[serde(default = "default_application_name")]
    pub name: String,
    #[serde(default = "default_application_version")]
    pub version: String,
    /// Archives are pulled straight from upstream, so checksums are off by default.
    #[serde(default)]
    pub checksum: bool,
}

impl Default for ApplicationHeader {
    fn default() -> Self {
        ApplicationHeader {
            name: default_application_name(),
            version: default_application_version(),
            checksum: false,
        }
    }
}

/// Upstream release listing endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Name of an environment variable holding a bearer token, if any.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            token_env: None,
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// External archiver settings. Invoked as `<program> a <output> <input dir>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackerConfig {
    #[serde(default = "default_packer_program")]
    pub program: PathBuf,
    #[serde(default = "default_packer_timeout_secs")]
    pub timeout_secs: u64,
}

impl PackerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PackerConfig {
    fn default() -> Self {
        PackerConfig {
            program: default_packer_program(),
            timeout_secs: default_packer_timeout_secs(),
        }
    }
}

/// Root of the YAML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub application: ApplicationHeader,
    pub repository_root: PathBuf,
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    #[serde(default = "default_license_file")]
    pub license_file: PathBuf,
    #[serde(default = "default_archive_suffix")]
    pub archive_suffix: String,
    pub platforms: Vec<PlatformTag>,
    #[serde(default)]
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub packer: PackerConfig,
    pub families: Vec<Family>,
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

impl Config {
    /// Load, resolve relative paths against the file's directory, and validate.
    ///
    /// Returns `ConfigError::Io` if unreadable, `ConfigError::Parse` (with path
    /// + line context) if malformed YAML, and the validation error otherwise.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Config::from_yaml_str(&contents, base).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse a YAML document whose relative paths are anchored at `base`.
    pub fn from_yaml_str(yaml: &str, base: &Path) -> Result<Config, ConfigError> {
        let mut config: Config = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.resolve_paths(base);
        config.validate()?;
        if is_within(base, &config.scratch_root) {
            return Err(ConfigError::Invalid(format!(
                "scratch_root {} contains the config directory and would be wiped on every run",
                config.scratch_root.display()
            )));
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.repository_root);
        anchor(&mut self.scratch_root);
        anchor(&mut self.assets_dir);
        if let Some(dir) = self.template_dir.as_mut() {
            anchor(dir);
        }
        if let Some(file) = self.log_file.as_mut() {
            anchor(file);
        }
        // license_file is relative to assets_dir, not to the config file.
        if self.license_file.is_relative() {
            self.license_file = self.assets_dir.join(&self.license_file);
        }
    }

    // -----------------------------------------------------------------------
    // 3. Validate
    // -----------------------------------------------------------------------

    /// Check every semantic rule that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platforms.is_empty() {
            return Err(ConfigError::Invalid("at least one platform is required".into()));
        }
        if self.families.is_empty() {
            return Err(ConfigError::Invalid("at least one family is required".into()));
        }

        let mut seen_platforms = HashSet::new();
        for platform in &self.platforms {
            if platform.0.trim().is_empty() {
                return Err(ConfigError::Invalid("platform tags must not be empty".into()));
            }
            if !seen_platforms.insert(platform.0.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "platform '{platform}' is listed twice"
                )));
            }
        }

        if !self.archive_suffix.starts_with('.') || self.archive_suffix.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "archive_suffix '{}' must look like '.7z'",
                self.archive_suffix
            )));
        }
        if self.source.timeout_secs == 0 || self.packer.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()));
        }
        if self.max_parallel == Some(0) {
            return Err(ConfigError::Invalid("max_parallel must be at least 1".into()));
        }

        for family in &self.families {
            for (field, template) in [("id", &family.id), ("display_name", &family.display_name)] {
                if let Some(p) = template
                    .placeholders()
                    .into_iter()
                    .find(|p| *p != Placeholder::Platform)
                {
                    return Err(ConfigError::Invalid(format!(
                        "family '{}': {field} may only use {{platform}}, found {p}",
                        family.id
                    )));
                }
            }
            if family.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
                return Err(ConfigError::Invalid(format!(
                    "family '{}': repo '{}' must be 'owner/name'",
                    family.id, family.repo
                )));
            }
        }

        // Cell identifiers key the artifact and scratch directories, so two
        // cells sharing one would overwrite each other.
        let mut seen_ids = HashSet::new();
        for cell in self.cells()? {
            if cell.id.0.is_empty()
                || cell.id.0.contains(['/', '\\'])
                || cell.id.0 == "."
                || cell.id.0 == ".."
            {
                return Err(ConfigError::Invalid(format!(
                    "cell identifier '{}' is not a valid directory name",
                    cell.id
                )));
            }
            if !seen_ids.insert(cell.id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "cell identifier '{}' is produced twice; include {{platform}} in family ids",
                    cell.id
                )));
            }
        }
        self.validate_scratch_root()
    }

    /// The scratch root is deleted at the start of every run and each cell
    /// deletes `<scratch_root>/<cell id>` when it finishes. It must not hold
    /// anything else the run reads or publishes.
    fn validate_scratch_root(&self) -> Result<(), ConfigError> {
        let scratch = &self.scratch_root;
        let overlap = |what: &str, path: &Path| {
            ConfigError::Invalid(format!(
                "scratch_root {} overlaps {what} {}",
                scratch.display(),
                path.display()
            ))
        };

        // Neither may live inside the other: artifact dirs share cell names
        // with scratch dirs.
        if is_within(&self.repository_root, scratch) || is_within(scratch, &self.repository_root) {
            return Err(overlap("repository_root", &self.repository_root));
        }

        let mut inputs = vec![
            ("assets_dir", &self.assets_dir),
            ("license_file", &self.license_file),
        ];
        if let Some(dir) = &self.template_dir {
            inputs.push(("template_dir", dir));
        }
        if let Some(file) = &self.log_file {
            inputs.push(("log_file", file));
        }
        // Inputs may contain the scratch root (`assets_dir: .` with the
        // default `temp`), but never sit inside it.
        for (what, path) in inputs {
            if is_within(path, scratch) {
                return Err(overlap(what, path));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // 4. Derived values
    // -----------------------------------------------------------------------

    /// Platforms × families, platform-major.
    pub fn cells(&self) -> Result<Vec<Cell>, ConfigError> {
        let mut cells = Vec::with_capacity(self.platforms.len() * self.families.len());
        for platform in &self.platforms {
            for family in &self.families {
                let id = family.cell_id(platform).map_err(|source| ConfigError::Template {
                    family: family.id.to_string(),
                    source,
                })?;
                cells.push(Cell {
                    platform: platform.clone(),
                    family: family.clone(),
                    id,
                });
            }
        }
        Ok(cells)
    }

    /// `<repository_root>/Updates.xml`
    pub fn manifest_path(&self) -> PathBuf {
        self.repository_root.join(MANIFEST_FILE_NAME)
    }

    /// `<assets_dir>/scripts/<platform>-<script>.qs`
    pub fn script_path(&self, family: &Family, platform: &PlatformTag) -> PathBuf {
        self.assets_dir.join("scripts").join(family.script_file(platform))
    }
}

/// True if `path` is `ancestor` or lies below it, comparing lexically.
fn is_within(path: &Path, ancestor: &Path) -> bool {
    lexical(path).starts_with(lexical(ancestor))
}

/// Drop `.` components and fold `..` into its parent without touching the
/// filesystem.
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

fn default_application_name() -> String {
    "{AnyApplication}".to_owned()
}

fn default_application_version() -> String {
    "1.0.0".to_owned()
}

fn default_api_base() -> String {
    "https://api.github.com".to_owned()
}

fn default_user_agent() -> String {
    format!("ifwrepo/{}", env!("CARGO_PKG_VERSION"))
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_packer_program() -> PathBuf {
    PathBuf::from("7za")
}

fn default_packer_timeout_secs() -> u64 {
    300
}

fn default_scratch_root() -> PathBuf {
    PathBuf::from("temp")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_license_file() -> PathBuf {
    PathBuf::from("license.txt")
}

fn default_archive_suffix() -> String {
    ".7z".to_owned()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
