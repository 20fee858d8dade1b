//! Template context: flat rendering payload built from a [`Manifest`].
//!
//! Dates and enums are pre-formatted here so templates only print strings.

use serde::Serialize;

use ifwrepo_core::types::{Manifest, PackageDescriptor};

use crate::error::RenderError;

/// Payload handed to the manifest template.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestContext {
    pub application: ApplicationCtx,
    pub packages: Vec<PackageCtx>,
}

/// Header fields.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationCtx {
    pub name: String,
    pub version: String,
    pub checksum: bool,
}

/// One `PackageUpdate` entry.
#[derive(Debug, Clone, Serialize)]
pub struct PackageCtx {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub downloadable_archive: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub os: String,
    /// `YYYY-MM-DD`
    pub release_date: String,
    pub description: String,
    pub default: String,
    pub licenses: Vec<LicenseCtx>,
    pub script: String,
    pub sha: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseCtx {
    pub file: String,
    pub name: String,
}

impl From<&PackageDescriptor> for PackageCtx {
    fn from(p: &PackageDescriptor) -> Self {
        PackageCtx {
            name: p.name.0.clone(),
            display_name: p.display_name.clone(),
            version: p.version.clone(),
            downloadable_archive: p.downloadable_archive.clone(),
            uncompressed_size: p.update_file.uncompressed_size,
            compressed_size: p.update_file.compressed_size,
            os: p.update_file.os.clone(),
            release_date: p.release_date.format("%Y-%m-%d").to_string(),
            description: p.description.replace("\r\n", "\n"),
            default: p.default.to_string(),
            licenses: p
                .licenses
                .iter()
                .map(|l| LicenseCtx {
                    file: l.file.clone(),
                    name: l.name.clone(),
                })
                .collect(),
            script: p.script.clone(),
            sha: p.sha.clone(),
        }
    }
}

impl ManifestContext {
    /// Build a [`ManifestContext`] from a [`Manifest`], preserving entry order.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        ManifestContext {
            application: ApplicationCtx {
                name: manifest.header.name.clone(),
                version: manifest.header.version.clone(),
                checksum: manifest.header.checksum,
            },
            packages: manifest.packages.iter().map(PackageCtx::from).collect(),
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ifwrepo_core::{
        ApplicationHeader, CellId, DefaultSelection, License, UpdateFile,
    };

    fn package(name: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: CellId::from(name),
            display_name: "Citra Nightly".into(),
            version: "1234".into(),
            downloadable_archive: "citra-linux.7z".into(),
            update_file: UpdateFile::estimate(500),
            release_date: NaiveDate::from_ymd_opt(2020, 1, 9).unwrap(),
            description: "line one\r\nline two".into(),
            default: DefaultSelection::Script,
            licenses: vec![License {
                file: "license.txt".into(),
                name: "GPLv2".into(),
            }],
            script: "installscript.qs".into(),
            sha: "ff00".into(),
        }
    }

    #[test]
    fn context_fields_populated() {
        let manifest = Manifest {
            header: ApplicationHeader::default(),
            packages: vec![package("b.linux"), package("a.linux")],
        };
        let ctx = ManifestContext::from_manifest(&manifest);
        assert_eq!(ctx.application.name, "{AnyApplication}");
        assert!(!ctx.application.checksum);
        assert_eq!(ctx.packages.len(), 2);
        assert_eq!(ctx.packages[0].name, "b.linux", "entry order must be preserved");
        assert_eq!(ctx.packages[0].release_date, "2020-01-09");
        assert_eq!(ctx.packages[0].default, "script");
        assert_eq!(ctx.packages[0].uncompressed_size, 1000);
        assert_eq!(ctx.packages[0].description, "line one\nline two");
    }

    #[test]
    fn tera_context_exposes_header_and_packages() {
        let manifest = Manifest {
            header: ApplicationHeader::default(),
            packages: vec![package("x")],
        };
        let tera_ctx = ManifestContext::from_manifest(&manifest)
            .to_tera_context()
            .expect("context conversion");
        let packages = tera_ctx.get("packages").and_then(|v| v.as_array());
        assert_eq!(packages.map(Vec::len), Some(1));
        assert_eq!(packages.unwrap()[0]["name"], "x");
        let application = tera_ctx.get("application").expect("application");
        assert_eq!(application["name"], "{AnyApplication}");
        assert_eq!(application["checksum"], false);
    }
}
