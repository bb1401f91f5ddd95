//! Cloud storage through the `gsutil` command-line tool

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::ObjectStore;
use crate::error::{Error, Result};
use crate::types::FileProvider;

/// Message gsutil prints when a listing matches nothing
const NO_MATCH: &str = "matched no objects";

/// Store for `gs://` URIs that shells out to `gsutil`
///
/// Authentication is whatever the installed gsutil is configured with.
#[derive(Debug, Clone)]
pub struct GsutilStore {
    program: String,
}

impl Default for GsutilStore {
    fn default() -> Self {
        Self::new("gsutil")
    }
}

impl GsutilStore {
    /// Create a store running `program` (a name on `PATH` or a full path)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn copy(&self, from: &OsStr, to: &OsStr) -> Result<()> {
        let output = self
            .run([OsStr::new("-q"), OsStr::new("cp"), from, to])
            .await
            .map_err(|e| {
                Error::transfer(
                    from.to_string_lossy(),
                    to.to_string_lossy(),
                    format!("failed to run {}: {}", self.program, e),
                )
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No URLs matched") || stderr.contains(NO_MATCH) {
            return Err(Error::ObjectNotFound {
                uri: from.to_string_lossy().into_owned(),
            });
        }
        Err(Error::transfer(
            from.to_string_lossy(),
            to.to_string_lossy(),
            format!("gsutil exited with {:?}: {}", output.status.code(), stderr.trim()),
        ))
    }
}

#[async_trait]
impl ObjectStore for GsutilStore {
    fn name(&self) -> &'static str {
        "gsutil"
    }

    fn provider(&self) -> FileProvider {
        FileProvider::Gcs
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(uri = %remote, path = %local.display(), "gsutil download");
        self.copy(OsStr::new(remote), local.as_os_str()).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        debug!(path = %local.display(), uri = %remote, "gsutil upload");
        self.copy(local.as_os_str(), OsStr::new(remote)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}**", prefix);
        let output = self
            .run(["ls", pattern.as_str()])
            .await
            .map_err(|e| Error::transfer(prefix, "listing", format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains(NO_MATCH) {
                return Ok(Vec::new());
            }
            return Err(Error::transfer(
                prefix,
                "listing",
                format!("gsutil ls exited with {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }

        let mut uris: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("gs://") && !line.ends_with('/') && !line.ends_with(':'))
            .map(str::to_string)
            .collect();
        uris.sort();
        Ok(uris)
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let uris = self.list(prefix).await?;
        if uris.is_empty() {
            return Ok(0);
        }

        let mut args = vec!["-q", "-m", "rm"];
        args.extend(uris.iter().map(String::as_str));
        let output = self
            .run(args)
            .await
            .map_err(|e| Error::transfer(prefix, "removal", format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(prefix = %prefix, stderr = %stderr.trim(), "gsutil rm reported errors");
            return Err(Error::transfer(prefix, "removal", stderr.trim().to_string()));
        }
        Ok(uris.len())
    }
}
