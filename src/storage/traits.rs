//! Object store trait
//!
//! Every provider a location can live on implements [`ObjectStore`]. URIs
//! passed to a store are normalized [`Location`](crate::types::Location)
//! URIs: `gs://bucket/key` for cloud objects, absolute paths for local files.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FileProvider;

/// Copy, list and remove objects on one provider
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name for logs (e.g., "local", "gsutil")
    fn name(&self) -> &'static str;

    /// Provider whose URIs this store understands
    fn provider(&self) -> FileProvider;

    /// Copy one object to a local file, creating parent directories
    ///
    /// An existing local file is overwritten.
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Copy one local file to an object, replacing any existing object
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// URIs of every object whose URI starts with `prefix`, sorted
    ///
    /// Listing is recursive. A prefix matching nothing yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check whether exactly `uri` exists
    async fn exists(&self, uri: &str) -> Result<bool> {
        Ok(self.list(uri).await?.iter().any(|u| u == uri))
    }

    /// Remove every object under `prefix`, returning how many were removed
    ///
    /// Idempotent: removing an empty prefix succeeds with 0.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize>;
}
