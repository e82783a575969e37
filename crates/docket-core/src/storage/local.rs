use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ObjectStore, Result, StorageLocator};

/// A directory standing in for object storage, laid out as `root/bucket/object`.
///
/// Used for dry runs and tests.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local path backing `locator`.
    pub fn path_for(&self, locator: &StorageLocator) -> PathBuf {
        let mut path = self.root.join(&locator.bucket);
        for part in locator.object.split('/').filter(|p| !p.is_empty() && *p != "..") {
            path.push(part);
        }
        path
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn upload(&self, local: &Path, locator: &StorageLocator) -> Result<()> {
        let dest = self.path_for(locator);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &dest).await?;
        debug!("Copied {} to {}", local.display(), dest.display());
        Ok(())
    }

    async fn download(&self, locator: &StorageLocator, dest: &Path) -> Result<()> {
        tokio::fs::copy(self.path_for(locator), dest).await?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageLocator>> {
        let bucket_root = self.root.join(bucket);
        if !tokio::fs::try_exists(&bucket_root).await? {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut pending = vec![bucket_root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let object = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if object.starts_with(prefix) {
                    objects.push(StorageLocator::new(bucket, object));
                }
            }
        }

        objects.sort_by(|a, b| a.object.cmp(&b.object));
        Ok(objects)
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<()> {
        let path = self.path_for(locator);
        tokio::fs::remove_file(&path).await?;
        debug!("Removed {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_download() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());
        let loc = StorageLocator::new("scratch", "adhoc/id/inv.pdf");

        let src = root.path().join("src.pdf");
        std::fs::write(&src, b"pdf").unwrap();
        store.upload(&src, &loc).await.unwrap();
        assert!(root.path().join("scratch/adhoc/id/inv.pdf").exists());

        let back = root.path().join("back.pdf");
        store.download(&loc, &back).await.unwrap();
        assert_eq!(std::fs::read(back).unwrap(), b"pdf");
    }

    #[test]
    fn test_path_for_stays_under_root() {
        let store = LocalStore::new("/archive");
        let path = store.path_for(&StorageLocator::new("b", "../../etc/passwd"));
        assert_eq!(path, PathBuf::from("/archive/b/etc/passwd"));
    }

    #[tokio::test]
    async fn test_download_missing() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());
        let err = store
            .download(&StorageLocator::new("b", "nope.pdf"), &root.path().join("x"))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::new(root.path());
        let src = root.path().join("src.pdf");
        std::fs::write(&src, b"pdf").unwrap();

        for object in ["adhoc/b/inv.pdf", "adhoc/a/inv.pdf", "other/x.pdf"] {
            store.upload(&src, &StorageLocator::new("scratch", object)).await.unwrap();
        }

        let listed: Vec<String> = store
            .list("scratch", "adhoc/")
            .await
            .unwrap()
            .iter()
            .map(|l| l.to_string())
            .collect();
        assert_eq!(
            listed,
            vec!["gs://scratch/adhoc/a/inv.pdf", "gs://scratch/adhoc/b/inv.pdf"]
        );
        assert_eq!(store.list("scratch", "").await.unwrap().len(), 3);
        assert!(store.list("missing", "").await.unwrap().is_empty());

        let target = StorageLocator::new("scratch", "adhoc/a/inv.pdf");
        store.delete(&target).await.unwrap();
        assert_eq!(store.list("scratch", "adhoc/").await.unwrap().len(), 1);
        assert!(store.delete(&target).await.is_err());
    }
}
