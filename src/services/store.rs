use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Landing zone for sanitized uploads.
///
/// Every file placed here gets a name generated at write time that is
/// unique across concurrent requests and process restarts. Callers never
/// influence the name, which rules out path traversal and collisions by
/// construction.
#[async_trait]
pub trait TempStore: Send + Sync {
    /// Persist `data` under a freshly generated unique name and return
    /// the absolute path of the new file.
    async fn put(&self, data: &[u8], extension: &str) -> Result<PathBuf>;

    /// Remove a previously stored file.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Whether the store is currently able to accept writes.
    async fn is_writable(&self) -> bool;
}

/// Filesystem-backed store over a private directory (created with mode
/// 0o700 on Unix, outside any public web root).
pub struct FsTempStore {
    dir: PathBuf,
}

impl FsTempStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create temp store at {}", dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to restrict {}", dir.display()))?;
        }

        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {}", dir.display()))?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl TempStore for FsTempStore {
    async fn put(&self, data: &[u8], extension: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.{}", Uuid::new_v4(), extension));

        if let Err(e) = tokio::fs::write(&path, data).await {
            // A failed write can leave a truncated file behind (disk full);
            // never let it outlive the request.
            if let Err(cleanup_err) = tokio::fs::remove_file(&path).await {
                if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to remove partial file {}: {}",
                        path.display(),
                        cleanup_err
                    );
                }
            }
            return Err(e).with_context(|| format!("failed to write {}", path.display()));
        }

        Ok(path)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("failed to delete {}", path.display()))
    }

    async fn is_writable(&self) -> bool {
        let probe = self.dir.join(format!(".probe-{}", Uuid::new_v4()));
        match tokio::fs::write(&probe, b"ok").await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&probe).await;
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_generates_unique_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsTempStore::new(tmp.path().join("store")).unwrap();

        let a = store.put(b"same bytes", "png").await.unwrap();
        let b = store.put(b"same bytes", "png").await.unwrap();

        assert_ne!(a, b);
        assert!(a.exists());
        assert!(b.exists());
        assert_eq!(a.extension().unwrap(), "png");
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsTempStore::new(tmp.path().join("store")).unwrap();

        let path = store.put(b"bytes", "png").await.unwrap();
        store.delete(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_store_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let store = FsTempStore::new(tmp.path().join("store")).unwrap();

        let mode = std::fs::metadata(store.dir()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_is_writable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsTempStore::new(tmp.path().join("store")).unwrap();
        assert!(store.is_writable().await);
    }
}
