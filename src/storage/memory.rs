//! In-memory object store for testing
//!
//! Holds objects in a map keyed by URI and can be told to fail transfers,
//! standing in for a cloud store in unit and integration tests.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::ObjectStore;
use crate::error::{Error, Result};
use crate::types::FileProvider;

/// Track method call counts for verification
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCallCounts {
    pub downloads: u32,
    pub uploads: u32,
    pub lists: u32,
    pub removes: u32,
}

/// In-memory implementation of [`ObjectStore`]
pub struct MemoryStore {
    provider: FileProvider,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    failing: RwLock<HashSet<String>>,
    call_counts: RwLock<StoreCallCounts>,
}

impl MemoryStore {
    /// Create an empty store answering for `provider`
    pub fn new(provider: FileProvider) -> Self {
        Self {
            provider,
            objects: RwLock::new(BTreeMap::new()),
            failing: RwLock::new(HashSet::new()),
            call_counts: RwLock::new(StoreCallCounts::default()),
        }
    }

    /// Put an object into the store
    pub fn insert(&self, uri: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.write().insert(uri.into(), data.into());
    }

    /// Read an object back
    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.objects.read().get(uri).cloned()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.objects.read().contains_key(uri)
    }

    /// All object URIs, sorted
    pub fn uris(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Make every transfer touching `uri` fail
    pub fn fail_on(&self, uri: impl Into<String>) {
        self.failing.write().insert(uri.into());
    }

    pub fn call_counts(&self) -> StoreCallCounts {
        *self.call_counts.read()
    }

    fn check_failure(&self, uri: &str, from: &dyn std::fmt::Display, to: &dyn std::fmt::Display) -> Result<()> {
        if self.failing.read().contains(uri) {
            return Err(Error::transfer(from, to, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn provider(&self) -> FileProvider {
        self.provider
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        self.call_counts.write().downloads += 1;
        self.check_failure(remote, &remote, &local.display())?;

        let data = self.get(remote).ok_or_else(|| Error::ObjectNotFound {
            uri: remote.to_string(),
        })?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, data).await.map_err(|e| Error::IoWrite {
            path: local.to_path_buf(),
            source: e,
        })
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        self.call_counts.write().uploads += 1;
        self.check_failure(remote, &local.display(), &remote)?;

        let data = tokio::fs::read(local)
            .await
            .map_err(|e| Error::transfer(local.display(), remote, e.to_string()))?;
        self.insert(remote, data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.call_counts.write().lists += 1;
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|uri| uri.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        self.call_counts.write().removes += 1;
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|uri, _| !uri.starts_with(prefix));
        Ok(before - objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(FileProvider::Gcs);
        store.insert("gs://bucket/a.txt", "alpha");

        let local = dir.path().join("in/a.txt");
        store.download("gs://bucket/a.txt", &local).await.unwrap();
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "alpha");

        store.upload(&local, "gs://bucket/out/a.txt").await.unwrap();
        assert_eq!(store.get("gs://bucket/out/a.txt").unwrap(), b"alpha");

        let counts = store.call_counts();
        assert_eq!(counts.downloads, 1);
        assert_eq!(counts.uploads, 1);
    }

    #[tokio::test]
    async fn test_memory_missing_and_injected_failure() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(FileProvider::Gcs);

        let err = store.download("gs://bucket/none", &dir.path().join("x")).await.unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));

        store.insert("gs://bucket/a", "a");
        store.fail_on("gs://bucket/a");
        let err = store.download("gs://bucket/a", &dir.path().join("a")).await.unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_memory_list_and_remove() {
        let store = MemoryStore::new(FileProvider::Gcs);
        store.insert("gs://bucket/dir/a", "a");
        store.insert("gs://bucket/dir/sub/b", "b");
        store.insert("gs://bucket/other", "c");

        assert_eq!(store.list("gs://bucket/dir/").await.unwrap().len(), 2);
        assert!(store.exists("gs://bucket/other").await.unwrap());
        assert!(!store.exists("gs://bucket/dir").await.unwrap());

        assert_eq!(store.remove_prefix("gs://bucket/dir/").await.unwrap(), 2);
        assert_eq!(store.remove_prefix("gs://bucket/dir/").await.unwrap(), 0);
        assert_eq!(store.uris(), ["gs://bucket/other"]);
    }
}
