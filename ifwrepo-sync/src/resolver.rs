//! Cell resolver: one family on one platform, from release list to entry.

use std::sync::Arc;

use tokio::fs;

use ifwrepo_core::{Cell, Config, PackageDescriptor, Release};

use crate::error::{io_err, SyncError};
use crate::materializer::{Materialized, Materializer, StagingFiles};
use crate::source::{select_asset, UpstreamRelease};
use crate::writer;

/// What resolving a cell produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No upstream asset for this platform. Recoverable.
    Skip,
    Package {
        descriptor: PackageDescriptor,
        artifact: Materialized,
    },
}

/// What resolving a cell *would* do; used by dry runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Skip,
    Build(Release),
    Reuse(Release),
}

/// Resolves cells against already-fetched release lists.
#[derive(Debug, Clone)]
pub struct CellResolver {
    config: Arc<Config>,
    materializer: Materializer,
}

impl CellResolver {
    pub fn new(config: Arc<Config>) -> Self {
        let materializer = Materializer::from_config(&config);
        CellResolver {
            config,
            materializer,
        }
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// License and install script copied into `cell`'s archive.
    pub fn staging_for(&self, cell: &Cell) -> StagingFiles {
        StagingFiles {
            license: self.config.license_file.clone(),
            script: self.config.script_path(&cell.family, &cell.platform),
        }
    }

    /// The release `cell` tracks, or `None` when upstream has nothing for it.
    pub fn select(
        &self,
        cell: &Cell,
        releases: &[UpstreamRelease],
    ) -> Result<Option<Release>, SyncError> {
        let release = select_asset(releases, &cell.platform, &self.config.archive_suffix)?;
        if release.is_none() {
            tracing::info!(
                cell = %cell.id,
                platform = %cell.platform,
                "no release found for platform, skipping"
            );
        }
        Ok(release)
    }

    /// Select, materialize, hash and describe `cell`.
    pub async fn resolve(
        &self,
        cell: &Cell,
        releases: &[UpstreamRelease],
    ) -> Result<Resolution, SyncError> {
        let Some(release) = self.select(cell, releases)? else {
            return Ok(Resolution::Skip);
        };

        let staging = self.staging_for(cell);
        let artifact = self
            .materializer
            .materialize(&cell.id, &release.version, &staging)
            .await?;
        let sha = writer::sha256_file(artifact.path()).await?;
        let descriptor = PackageDescriptor::assemble(cell, &release, sha)?;

        tracing::debug!(
            cell = %cell.id,
            version = %release.version,
            new = artifact.is_new(),
            "cell resolved"
        );
        Ok(Resolution::Package {
            descriptor,
            artifact,
        })
    }

    /// Like [`resolve`](Self::resolve) but touches nothing on disk.
    pub async fn plan(
        &self,
        cell: &Cell,
        releases: &[UpstreamRelease],
    ) -> Result<Plan, SyncError> {
        let Some(release) = self.select(cell, releases)? else {
            return Ok(Plan::Skip);
        };
        let target = self.materializer.artifact_path(&cell.id, &release.version);
        let exists = fs::try_exists(&target)
            .await
            .map_err(|e| io_err(&target, e))?;
        Ok(if exists {
            Plan::Reuse(release)
        } else {
            Plan::Build(release)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::source::UpstreamAsset;
    use chrono::{TimeZone, Utc};
    use ifwrepo_core::types::ANY_OS;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_config(root: &Path, packer: &Path) -> Arc<Config> {
        let assets = root.join("assets");
        std::fs::create_dir_all(assets.join("scripts")).unwrap();
        std::fs::write(assets.join("license.txt"), "GPL").unwrap();
        std::fs::write(assets.join("scripts/linux-nightly.qs"), "script").unwrap();
        let yaml = format!(
            r#"
repository_root: repo
scratch_root: temp
assets_dir: assets
platforms: [linux]
packer:
  program: {}
families:
  - id: "org.citra.nightly.{{platform}}"
    display_name: "Citra Nightly"
    description: "({{platform}}, commit: {{commit_hash}}, release date: {{release_date}})"
    repo: citra-emu/citra-nightly
    script: nightly
"#,
            packer.display()
        );
        Arc::new(Config::from_yaml_str(&yaml, root).unwrap())
    }

    fn packer(root: &Path) -> std::path::PathBuf {
        let path = root.join("pack.sh");
        std::fs::write(&path, "#!/bin/sh\necho called >> \"$PWD/../../packer.log\"\ncat \"$3\"/installscript.qs > \"$2\"\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn releases(tag: &str, asset: &str) -> Vec<UpstreamRelease> {
        vec![UpstreamRelease {
            tag_name: tag.into(),
            published_at: Some(Utc.with_ymd_and_hms(2019, 5, 2, 10, 0, 0).unwrap()),
            assets: vec![UpstreamAsset {
                name: asset.into(),
                size: 1_000_000,
            }],
        }]
    }

    #[tokio::test]
    async fn resolves_descriptor_with_digest_of_artifact() {
        let root = TempDir::new().unwrap();
        let config = write_config(root.path(), &packer(root.path()));
        let cell = config.cells().unwrap().remove(0);
        let resolver = CellResolver::new(config.clone());

        let rel = releases("nightly-1234", "citra-linux-20190502.7z");
        let Resolution::Package {
            descriptor,
            artifact,
        } = resolver.resolve(&cell, &rel).await.unwrap()
        else {
            panic!("expected a package");
        };

        assert!(artifact.is_new());
        assert_eq!(
            artifact.path(),
            root.path().join("repo/org.citra.nightly.linux/1234meta.7z")
        );
        assert_eq!(descriptor.sha, writer::sha256_hex(b"script"));
        assert_eq!(descriptor.version, "1234");
        assert_eq!(descriptor.downloadable_archive, "citra-linux-20190502.7z");
        assert_eq!(descriptor.update_file.uncompressed_size, 2_000_000);
        assert_eq!(descriptor.update_file.compressed_size, 1_000_000);
        assert_eq!(descriptor.update_file.os, ANY_OS);
        assert_eq!(
            descriptor.description,
            "(linux, commit: nightly-1234, release date: 2019-05-02)"
        );

        // Second resolution reuses the artifact but still reports its digest.
        let Resolution::Package {
            descriptor: again,
            artifact,
        } = resolver.resolve(&cell, &rel).await.unwrap()
        else {
            panic!("expected a package");
        };
        assert!(!artifact.is_new());
        assert_eq!(again, descriptor);
    }

    #[tokio::test]
    async fn not_found_is_a_skip() {
        let root = TempDir::new().unwrap();
        let config = write_config(root.path(), &packer(root.path()));
        let cell = config.cells().unwrap().remove(0);
        let resolver = CellResolver::new(config);

        let rel = releases("nightly-1", "citra-windows-mingw.7z");
        assert_eq!(resolver.resolve(&cell, &rel).await.unwrap(), Resolution::Skip);
        assert_eq!(resolver.plan(&cell, &rel).await.unwrap(), Plan::Skip);
        assert!(!root.path().join("packer.log").exists());
        assert!(!root.path().join("repo").exists());
    }

    #[tokio::test]
    async fn malformed_tag_is_an_error() {
        let root = TempDir::new().unwrap();
        let config = write_config(root.path(), &packer(root.path()));
        let cell = config.cells().unwrap().remove(0);
        let resolver = CellResolver::new(config);

        let err = resolver
            .resolve(&cell, &releases("nightly", "citra-linux.7z"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedTag { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn plan_reports_build_then_reuse_without_packing() {
        let root = TempDir::new().unwrap();
        let config = write_config(root.path(), &packer(root.path()));
        let cell = config.cells().unwrap().remove(0);
        let resolver = CellResolver::new(config.clone());
        let rel = releases("nightly-9", "citra-linux.7z");

        assert!(matches!(resolver.plan(&cell, &rel).await.unwrap(), Plan::Build(r) if r.version == "9"));
        assert!(!root.path().join("repo").exists());

        resolver.resolve(&cell, &rel).await.unwrap();
        assert!(matches!(resolver.plan(&cell, &rel).await.unwrap(), Plan::Reuse(_)));
    }
}
