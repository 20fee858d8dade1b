//! Atomic file publication and content hashing.
//!
//! ## Publication protocol
//!
//! 1. Ensure the destination's parent directory exists.
//! 2. Write (or copy) the bytes to `<dest>.ifwrepo.tmp` beside the destination.
//! 3. Rename onto the final path (atomic on POSIX, same filesystem).
//! 4. On any failure remove the `.tmp`; the destination is never half-written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::{io_err, SyncError};

/// Sibling temp path used while publishing `path`.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.ifwrepo.tmp", path.display()))
}

/// Atomically write `content` to `path`.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    let tmp = tmp_path_for(path);
    atomic_write_with_tmp(path, content, &tmp).await
}

async fn atomic_write_with_tmp(path: &Path, content: &[u8], tmp: &Path) -> Result<(), SyncError> {
    ensure_parent(path).await?;
    if let Err(e) = fs::write(tmp, content).await {
        let _ = fs::remove_file(tmp).await;
        return Err(io_err(tmp, e));
    }
    rename_into_place(tmp, path).await?;
    tracing::debug!(path = %path.display(), "wrote");
    Ok(())
}

/// Atomically place a copy of `src` at `dest`.
///
/// `src` may live on another filesystem (the scratch root), so the bytes are
/// copied next to `dest` first and only the final rename touches `dest`.
pub async fn publish_file(src: &Path, dest: &Path) -> Result<(), SyncError> {
    let tmp = tmp_path_for(dest);
    ensure_parent(dest).await?;
    if let Err(e) = fs::copy(src, &tmp).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(src, e));
    }
    rename_into_place(&tmp, dest).await
}

/// SHA-256 of the file's bytes, lowercase hex.
pub async fn sha256_file(path: &Path) -> Result<String, SyncError> {
    let bytes = fs::read(path).await.map_err(|e| io_err(path, e))?;
    Ok(sha256_hex(&bytes))
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Remove `path` and everything below it; a missing path is not an error.
pub async fn remove_dir_if_exists(path: &Path) -> Result<(), SyncError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Remove a single file; a missing file is not an error.
pub async fn remove_file_if_exists(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

async fn ensure_parent(path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| io_err(parent, e))?;
    }
    Ok(())
}

async fn rename_into_place(tmp: &Path, path: &Path) -> Result<(), SyncError> {
    if let Err(e) = fs::rename(tmp, path).await {
        let _ = fs::remove_file(tmp).await;
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn atomic_write_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repo").join("nested").join("Updates.xml");
        atomic_write(&path, b"<Updates/>").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<Updates/>");
    }

    #[tokio::test]
    async fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Updates.xml");
        atomic_write(&path, b"data").await.unwrap();
        assert!(!tmp_path_for(&path).exists(), ".ifwrepo.tmp must be cleaned up");
    }

    #[tokio::test]
    async fn publish_file_replaces_existing_content() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("meta.7z");
        let dest = tmp.path().join("repo").join("a.linux").join("1meta.7z");
        std::fs::write(&src, b"new").unwrap();
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"old").unwrap();

        publish_file(&src, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(src.exists(), "publish copies, the scratch file stays for cleanup");
        assert!(!tmp_path_for(&dest).exists());
    }

    #[tokio::test]
    async fn publish_missing_source_leaves_destination_absent() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("repo").join("1meta.7z");
        let err = publish_file(&tmp.path().join("missing.7z"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(!dest.exists());
        assert!(!tmp_path_for(&dest).exists());
    }

    #[tokio::test]
    async fn sha256_is_stable_for_same_bytes() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        std::fs::write(&a, b"abc").unwrap();
        std::fs::write(&b, b"abc").unwrap();
        let ha = sha256_file(&a).await.unwrap();
        assert_eq!(ha, sha256_file(&b).await.unwrap());
        assert_eq!(
            ha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn removing_missing_paths_is_ok() {
        let tmp = TempDir::new().unwrap();
        remove_dir_if_exists(&tmp.path().join("nope")).await.unwrap();
        remove_file_if_exists(&tmp.path().join("nope.txt")).await.unwrap();
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        std::fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("Updates.xml");
        std::fs::write(&path, "original").unwrap();

        let mut perms = std::fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        std::fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("Updates.xml.ifwrepo.tmp");

        let result = atomic_write_with_tmp(&path, b"new content", &tmp_path).await;

        let mut perms = std::fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&readonly_dir, perms).unwrap();

        // Root ignores directory permissions; only assert when the rename failed.
        if result.is_err() {
            let current = std::fs::read_to_string(&path).unwrap();
            assert_eq!(current, "original", "original file should be intact");
            assert!(!tmp_path.exists(), ".ifwrepo.tmp should be cleaned up");
        }
    }
}
