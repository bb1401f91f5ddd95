//! Delocalizer
//!
//! Uploads a task's declared outputs after its command succeeded.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::localizer::{bound_path, param_location, parent_dir};
use crate::error::{Error, Result};
use crate::storage::{walk_files, ObjectStore, StoreRegistry};
use crate::types::{Location, ParameterBinding, TaskDescriptor, TaskId};

/// Copies outputs from task workspaces to their destinations
#[derive(Clone)]
pub struct Delocalizer {
    stores: Arc<StoreRegistry>,
}

impl Delocalizer {
    pub fn new(stores: Arc<StoreRegistry>) -> Self {
        Self { stores }
    }

    /// Upload every output of `task`, returning the number of files copied
    ///
    /// Stops at the first missing output or failed upload. Outputs uploaded
    /// before the failure stay where they are.
    pub async fn delocalize(&self, task: &TaskDescriptor) -> Result<usize> {
        let mut uploaded = 0;
        for param in task.output_files() {
            uploaded += self
                .copy_out(task.task_id, param)
                .await
                .map_err(|e| match e {
                    Error::Delocalization { .. } => e,
                    other => Error::delocalization(task.task_id, &param.name, other.to_string()),
                })?;
        }
        info!(task_id = task.task_id, files = uploaded, "Outputs delocalized");
        Ok(uploaded)
    }

    async fn copy_out(&self, task_id: TaskId, param: &ParameterBinding) -> Result<usize> {
        let location = param_location(param)?;
        let local = bound_path(param)?;
        let store = self.stores.for_location(location)?;

        if param.recursive {
            let files = walk_files(local).await?;
            for file in &files {
                let relative = relative_uri_part(local, file);
                upload(store.as_ref(), file, &location.child(&relative)).await?;
            }
            Ok(files.len())
        } else if location.is_wildcard() {
            let files = matching_files(task_id, param, location, local).await?;
            for (file, name) in &files {
                upload(store.as_ref(), file, &location.child(name)).await?;
            }
            Ok(files.len())
        } else {
            if !tokio::fs::metadata(local).await.map(|m| m.is_file()).unwrap_or(false) {
                return Err(Error::delocalization(
                    task_id,
                    &param.name,
                    format!("declared output {} was not produced", local.display()),
                ));
            }
            upload(store.as_ref(), local, location.uri()).await?;
            Ok(1)
        }
    }
}

async fn upload(store: &dyn ObjectStore, local: &Path, uri: &str) -> Result<()> {
    debug!(path = %local.display(), uri = %uri, "Delocalizing");
    store.upload(local, uri).await
}

/// Files next to the pattern path whose name matches the pattern
async fn matching_files(
    task_id: TaskId,
    param: &ParameterBinding,
    location: &Location,
    local: &Path,
) -> Result<Vec<(std::path::PathBuf, String)>> {
    let pattern = glob::Pattern::new(location.basename())
        .map_err(|e| Error::unresolvable(location.uri(), e.to_string()))?;
    let dir = parent_dir(local);

    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => Some(entries),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(Error::IoRead { path: dir, source: e }),
    };
    if let Some(entries) = entries.as_mut() {
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_file() && pattern.matches(&name) {
                files.push((entry.path(), name));
            }
        }
    }

    if files.is_empty() {
        return Err(Error::delocalization(
            task_id,
            &param.name,
            format!("no files match {}", local.display()),
        ));
    }
    files.sort();
    Ok(files)
}

/// `file` relative to `root`, with `/` separators
fn relative_uri_part(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
