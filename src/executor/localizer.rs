//! Localizer
//!
//! Copies a task's inputs (and its script, if any) from their stores into
//! the task workspace before the command runs.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::TaskWorkspace;
use crate::error::{Error, Result};
use crate::storage::{ObjectStore, StoreRegistry};
use crate::types::{Location, ParameterBinding, TaskCommand, TaskDescriptor};

/// Copies inputs into task workspaces
#[derive(Clone)]
pub struct Localizer {
    stores: Arc<StoreRegistry>,
}

impl Localizer {
    pub fn new(stores: Arc<StoreRegistry>) -> Self {
        Self { stores }
    }

    /// Create the workspace, bind every file parameter and copy the inputs
    ///
    /// Re-running for the same task overwrites the same files. Any failure is
    /// reported as a localization error wrapping the cause; the workspace is
    /// left on disk.
    pub async fn localize(&self, task: &mut TaskDescriptor, workspace: &TaskWorkspace) -> Result<()> {
        let task_id = task.task_id;
        self.localize_inner(task, workspace)
            .await
            .map_err(|e| Error::localization(task_id, e))
    }

    async fn localize_inner(&self, task: &mut TaskDescriptor, workspace: &TaskWorkspace) -> Result<()> {
        workspace.create().await?;

        for param in task.params.iter_mut().filter(|p| p.is_file()) {
            param.bind_local_path(workspace.root())?;
        }

        let mut copied = 0;
        for param in task.input_files() {
            copied += self.copy_in(param).await?;
        }

        if let TaskCommand::Script { location, .. } = &*task.command {
            let store = self.stores.for_location(location)?;
            store.download(location.uri(), &workspace.script_path(location)).await?;
            copied += 1;
        }

        info!(task_id = task.task_id, files = copied, "Inputs localized");
        Ok(())
    }

    /// Create the directories outputs are written into
    pub async fn prepare_outputs(&self, task: &TaskDescriptor) -> Result<()> {
        for param in task.output_files() {
            let local = bound_path(param)?;
            let dir = if param.recursive {
                local.to_path_buf()
            } else {
                parent_dir(local)
            };
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::IoWrite { path: dir, source: e })?;
        }
        Ok(())
    }

    async fn copy_in(&self, param: &ParameterBinding) -> Result<usize> {
        let location = param_location(param)?;
        let local = bound_path(param)?;
        let store = self.stores.for_location(location)?;

        if param.recursive {
            let uris = store.list(location.path()).await?;
            for uri in &uris {
                let relative = uri.strip_prefix(location.path()).unwrap_or(uri);
                download(store.as_ref(), uri, &local.join(contained(uri, relative)?)).await?;
            }
            Ok(uris.len())
        } else if location.is_wildcard() {
            let matches = matching_objects(store.as_ref(), location).await?;
            let dir = parent_dir(local);
            for (uri, name) in &matches {
                download(store.as_ref(), uri, &dir.join(contained(uri, name)?)).await?;
            }
            Ok(matches.len())
        } else {
            download(store.as_ref(), location.uri(), local).await?;
            Ok(1)
        }
    }
}

async fn download(store: &dyn ObjectStore, uri: &str, local: &Path) -> Result<()> {
    debug!(uri = %uri, path = %local.display(), "Localizing");
    store.download(uri, local).await
}

/// Objects directly under the location's directory whose name matches its pattern
async fn matching_objects(store: &dyn ObjectStore, location: &Location) -> Result<Vec<(String, String)>> {
    let pattern = glob::Pattern::new(location.basename())
        .map_err(|e| Error::unresolvable(location.uri(), e.to_string()))?;

    let matches: Vec<(String, String)> = store
        .list(location.path())
        .await?
        .into_iter()
        .filter_map(|uri| {
            let name = uri.strip_prefix(location.path())?.to_string();
            (!name.contains('/') && pattern.matches(&name)).then_some((uri, name))
        })
        .collect();

    if matches.is_empty() {
        return Err(Error::ObjectNotFound {
            uri: location.uri().to_string(),
        });
    }
    Ok(matches)
}

pub(crate) fn param_location(param: &ParameterBinding) -> Result<&Location> {
    param
        .location
        .as_ref()
        .ok_or_else(|| Error::Internal(format!("file parameter {} has no location", param.name)))
}

pub(crate) fn bound_path(param: &ParameterBinding) -> Result<&Path> {
    param
        .local_path()
        .ok_or_else(|| Error::Internal(format!("parameter {} was never localized", param.name)))
}

/// `relative` as a path that cannot climb out of the directory it is joined to
fn contained<'a>(uri: &str, relative: &'a str) -> Result<&'a Path> {
    let path = Path::new(relative);
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(path)
    } else {
        Err(Error::unresolvable(uri, "object name leaves the input directory"))
    }
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
