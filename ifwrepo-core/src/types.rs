//! Domain types for the update repository.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Configuration types deserialize via serde + serde_yaml; manifest-facing
//! types serialize so the renderer and the JSON report can consume them.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ApplicationHeader;
use crate::error::TemplateError;
use crate::template::{Template, TemplateVars};

/// Uncompressed size is estimated as this multiple of the upstream asset size.
///
/// The true size is unknown without unpacking the archive; the estimate only
/// needs to be generous enough for the installer's free-space check.
pub const UNCOMPRESSED_SIZE_FACTOR: u64 = 2;

/// OS attribute written on every update file. The installer framework ignores
/// more specific values, so no OS gating is attempted.
pub const ANY_OS: &str = "Any";

/// Name of the install script inside every metadata archive.
pub const INSTALL_SCRIPT_NAME: &str = "installscript.qs";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An opaque platform tag, e.g. `linux`, `osx`, `mingw`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformTag(pub String);

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PlatformTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlatformTag {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Instantiated family identifier for one platform, e.g. `org.citra.nightly.linux`.
///
/// Doubles as the artifact subdirectory name and the scratch directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub String);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CellId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CellId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Value of the `Default` element: whether the package is preselected.
///
/// Accepts YAML booleans as well as the words `true`, `false` and `script`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", try_from = "DefaultSelectionCompat")]
pub enum DefaultSelection {
    True,
    False,
    /// Selection is decided by the install script.
    #[default]
    Script,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefaultSelectionCompat {
    Flag(bool),
    Word(String),
}

impl TryFrom<DefaultSelectionCompat> for DefaultSelection {
    type Error = String;

    fn try_from(value: DefaultSelectionCompat) -> Result<Self, Self::Error> {
        match value {
            DefaultSelectionCompat::Flag(true) => Ok(DefaultSelection::True),
            DefaultSelectionCompat::Flag(false) => Ok(DefaultSelection::False),
            DefaultSelectionCompat::Word(word) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(DefaultSelection::True),
                "false" => Ok(DefaultSelection::False),
                "script" => Ok(DefaultSelection::Script),
                other => Err(format!(
                    "unknown default selection '{other}'; expected: true, false, script"
                )),
            },
        }
    }
}

impl fmt::Display for DefaultSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultSelection::True => write!(f, "true"),
            DefaultSelection::False => write!(f, "false"),
            DefaultSelection::Script => write!(f, "script"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration structs
// ---------------------------------------------------------------------------

/// A license descriptor shown by the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct License {
    pub file: String,
    pub name: String,
}

/// A logical package line mirrored from one upstream repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Family {
    /// Identifier template; may only use `{platform}`.
    pub id: Template,
    /// Display-name template; may only use `{platform}`.
    pub display_name: Template,
    pub description: Template,
    /// Upstream `owner/name` whose releases are mirrored.
    pub repo: String,
    /// Script stem: `scripts/<platform>-<script>.qs`.
    pub script: String,
    #[serde(default)]
    pub default: DefaultSelection,
    #[serde(default)]
    pub licenses: Vec<License>,
}

impl Family {
    /// Identifier of this family on `platform`.
    pub fn cell_id(&self, platform: &PlatformTag) -> Result<CellId, TemplateError> {
        self.id
            .apply(&TemplateVars::for_platform(&platform.0))
            .map(CellId)
    }

    pub fn display_name_for(&self, platform: &PlatformTag) -> Result<String, TemplateError> {
        self.display_name.apply(&TemplateVars::for_platform(&platform.0))
    }

    pub fn description_for(
        &self,
        platform: &PlatformTag,
        release: &Release,
    ) -> Result<String, TemplateError> {
        let vars = TemplateVars::for_platform(&platform.0)
            .with_release(&release.commit, release.published);
        self.description.apply(&vars)
    }

    /// File name of the platform-specific install script for this family.
    pub fn script_file(&self, platform: &PlatformTag) -> String {
        format!("{}-{}.qs", platform.0, self.script)
    }
}

/// One unit of work: a family on a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub platform: PlatformTag,
    pub family: Family,
    /// Identifier computed from the family template at matrix construction.
    pub id: CellId,
}

// ---------------------------------------------------------------------------
// Release and manifest entries
// ---------------------------------------------------------------------------

/// The upstream release chosen for a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Second `-`-separated segment of the tag.
    pub version: String,
    /// Publish date at day precision.
    pub published: NaiveDate,
    pub asset_name: String,
    pub asset_size: u64,
    /// The raw release tag. Not a content digest.
    pub commit: String,
}

/// The `UpdateFile` attributes of a package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFile {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub os: String,
}

impl UpdateFile {
    /// Size attributes for an upstream asset of `asset_size` bytes.
    pub fn estimate(asset_size: u64) -> Self {
        UpdateFile {
            uncompressed_size: asset_size.saturating_mul(UNCOMPRESSED_SIZE_FACTOR),
            compressed_size: asset_size,
            os: ANY_OS.to_owned(),
        }
    }
}

/// A manifest entry describing one published package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: CellId,
    pub display_name: String,
    pub version: String,
    pub downloadable_archive: String,
    pub update_file: UpdateFile,
    pub release_date: NaiveDate,
    pub description: String,
    pub default: DefaultSelection,
    pub licenses: Vec<License>,
    pub script: String,
    /// Hex digest of the metadata archive currently on disk.
    pub sha: String,
}

impl PackageDescriptor {
    /// Assemble the entry for `cell` from its resolved release and archive digest.
    pub fn assemble(cell: &Cell, release: &Release, sha: String) -> Result<Self, TemplateError> {
        Ok(PackageDescriptor {
            name: cell.id.clone(),
            display_name: cell.family.display_name_for(&cell.platform)?,
            version: release.version.clone(),
            downloadable_archive: release.asset_name.clone(),
            update_file: UpdateFile::estimate(release.asset_size),
            release_date: release.published,
            description: cell.family.description_for(&cell.platform, release)?,
            default: cell.family.default,
            licenses: cell.family.licenses.clone(),
            script: INSTALL_SCRIPT_NAME.to_owned(),
            sha,
        })
    }
}

/// The aggregate document: fixed header plus ordered package entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub header: ApplicationHeader,
    pub packages: Vec<PackageDescriptor>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> Family {
        Family {
            id: Template::parse("org.citra.nightly.{platform}").unwrap(),
            display_name: Template::parse("Citra Nightly").unwrap(),
            description: Template::parse("({platform}, commit: {commit_hash}, release date: {release_date})")
                .unwrap(),
            repo: "citra-emu/citra-nightly".into(),
            script: "nightly".into(),
            default: DefaultSelection::Script,
            licenses: vec![License {
                file: "license.txt".into(),
                name: "GNU General Public License v2.0".into(),
            }],
        }
    }

    fn release(size: u64) -> Release {
        Release {
            version: "1234".into(),
            published: NaiveDate::from_ymd_opt(2019, 5, 2).unwrap(),
            asset_name: "citra-linux-20190502-abcdef.7z".into(),
            asset_size: size,
            commit: "nightly-1234".into(),
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(PlatformTag::from("linux").to_string(), "linux");
        assert_eq!(CellId::from("org.x.linux").to_string(), "org.x.linux");
    }

    #[test]
    fn size_estimate_doubles_upstream_size() {
        let f = UpdateFile::estimate(1_000_000);
        assert_eq!(f.uncompressed_size, 2_000_000);
        assert_eq!(f.compressed_size, 1_000_000);
        assert_eq!(f.os, "Any");
    }

    #[test]
    fn script_file_is_platform_prefixed() {
        assert_eq!(family().script_file(&PlatformTag::from("osx")), "osx-nightly.qs");
    }

    #[test]
    fn assemble_substitutes_platform_and_release() {
        let fam = family();
        let platform = PlatformTag::from("linux");
        let cell = Cell {
            id: fam.cell_id(&platform).unwrap(),
            platform,
            family: fam,
        };
        let desc = PackageDescriptor::assemble(&cell, &release(1_000_000), "ab12".into()).unwrap();
        assert_eq!(desc.name.0, "org.citra.nightly.linux");
        assert_eq!(desc.display_name, "Citra Nightly");
        assert_eq!(desc.version, "1234");
        assert_eq!(
            desc.description,
            "(linux, commit: nightly-1234, release date: 2019-05-02)"
        );
        assert_eq!(desc.update_file.uncompressed_size, 2_000_000);
        assert_eq!(desc.update_file.compressed_size, 1_000_000);
        assert_eq!(desc.update_file.os, ANY_OS);
        assert_eq!(desc.script, INSTALL_SCRIPT_NAME);
        assert_eq!(desc.sha, "ab12");
    }

    #[test]
    fn default_selection_serde_is_lowercase() {
        let d: DefaultSelection = serde_yaml::from_str("script").unwrap();
        assert_eq!(d, DefaultSelection::Script);
        let flag: DefaultSelection = serde_yaml::from_str("false").unwrap();
        assert_eq!(flag, DefaultSelection::False);
        assert!(serde_yaml::from_str::<DefaultSelection>("maybe").is_err());
        assert_eq!(serde_yaml::to_string(&DefaultSelection::Script).unwrap().trim(), "script");
        assert_eq!(DefaultSelection::True.to_string(), "true");
    }
}
