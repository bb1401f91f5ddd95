//! Local filesystem store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::ObjectStore;
use crate::error::{Error, Result};
use crate::types::FileProvider;

/// Store backed by the local filesystem; URIs are absolute paths
#[derive(Debug, Clone, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }
}

/// Every regular file below `root`, in no particular order
///
/// A missing `root` yields no files.
pub(crate) async fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::IoRead { path: dir, source: e }),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::transfer(from.display(), to.display(), e.to_string()))?;
    }
    match tokio::fs::copy(from, to).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !from.exists() => {
            Err(Error::ObjectNotFound {
                uri: from.display().to_string(),
            })
        }
        Err(e) => Err(Error::transfer(from.display(), to.display(), e.to_string())),
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn provider(&self) -> FileProvider {
        FileProvider::Local
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        debug!(uri = %remote, path = %local.display(), "Copying local file in");
        copy_file(Path::new(remote), local).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        debug!(path = %local.display(), uri = %remote, "Copying local file out");
        copy_file(local, Path::new(remote)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = if prefix.ends_with('/') {
            PathBuf::from(prefix)
        } else {
            match Path::new(prefix).parent() {
                Some(parent) => parent.to_path_buf(),
                None => return Ok(Vec::new()),
            }
        };

        let mut uris: Vec<String> = walk_files(&root)
            .await?
            .into_iter()
            .map(|p| p.display().to_string())
            .filter(|uri| uri.starts_with(prefix))
            .collect();
        uris.sort();
        Ok(uris)
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let uris = self.list(prefix).await?;
        for uri in &uris {
            match tokio::fs::remove_file(uri).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::IoWrite {
                        path: PathBuf::from(uri),
                        source: e,
                    })
                }
            }
        }
        debug!(prefix = %prefix, removed = uris.len(), "Removed local files");
        Ok(uris.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn uri(dir: &TempDir, rel: &str) -> String {
        dir.path().join(rel).display().to_string()
    }

    #[tokio::test]
    async fn test_upload_download() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new();

        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"hello").unwrap();

        let remote = uri(&dir, "bucket/nested/obj.txt");
        store.upload(&src, &remote).await.unwrap();
        assert!(store.exists(&remote).await.unwrap());

        let dest = dir.path().join("work/in/obj.txt");
        store.download(&remote, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");

        // Overwrites on repeat
        store.download(&remote, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_download_missing() {
        let dir = TempDir::new().unwrap();
        let err = LocalStore::new()
            .download(&uri(&dir, "missing.txt"), &dir.path().join("out.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_and_remove_prefix() {
        let dir = TempDir::new().unwrap();
        for rel in ["data/a.txt", "data/sub/b.txt", "data2/c.txt"] {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, rel).unwrap();
        }
        let store = LocalStore::new();

        let listed = store.list(&uri(&dir, "data/")).await.unwrap();
        assert_eq!(listed, [uri(&dir, "data/a.txt"), uri(&dir, "data/sub/b.txt")]);

        // String prefix, not directory prefix
        let listed = store.list(&uri(&dir, "data")).await.unwrap();
        assert_eq!(listed.len(), 3);

        assert_eq!(store.remove_prefix(&uri(&dir, "data/")).await.unwrap(), 2);
        assert_eq!(store.remove_prefix(&uri(&dir, "data/")).await.unwrap(), 0);
        assert!(store.exists(&uri(&dir, "data2/c.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_missing_root() {
        let dir = TempDir::new().unwrap();
        let listed = LocalStore::new().list(&uri(&dir, "nope/")).await.unwrap();
        assert!(listed.is_empty());
    }
}
