//! Per-task working directories
//!
//! Each task owns `<working_root>/<job_id>/task-<id>/`:
//!
//! ```text
//! task-1/
//! ├── input/    localized inputs (input/gs/<bucket>/..., input/file/...)
//! ├── output/   outputs written by the command
//! ├── script/   the command script, when the job runs one
//! ├── logs/     stdout.log, stderr.log
//! └── tmp/      $TMPDIR for the command
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Location, TaskId};

const SUBDIRS: &[&str] = &["input", "output", "script", "logs", "tmp"];

/// Directory layout of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWorkspace {
    root: PathBuf,
}

impl TaskWorkspace {
    /// Workspace of `task_id` within the job directory
    pub fn new(working_root: &Path, job_id: &str, task_id: TaskId) -> Self {
        Self {
            root: working_root.join(job_id).join(format!("task-{}", task_id)),
        }
    }

    /// Create the task directory and its subdirectories
    ///
    /// Existing directories are kept.
    pub async fn create(&self) -> Result<()> {
        for sub in SUBDIRS {
            let dir = self.root.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::IoWrite { path: dir, source: e })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn script_dir(&self) -> PathBuf {
        self.root.join("script")
    }

    /// Local copy of a script stored at `location`
    pub fn script_path(&self, location: &Location) -> PathBuf {
        self.script_dir().join(location.basename())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.logs_dir().join("stdout.log")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.logs_dir().join("stderr.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_layout() {
        let dir = TempDir::new().unwrap();
        let ws = TaskWorkspace::new(dir.path(), "job-1", 3);
        assert_eq!(ws.root(), dir.path().join("job-1/task-3"));

        ws.create().await.unwrap();
        for sub in SUBDIRS {
            assert!(ws.root().join(sub).is_dir(), "{sub} missing");
        }
        assert_eq!(ws.stdout_log(), ws.root().join("logs/stdout.log"));

        // Idempotent
        ws.create().await.unwrap();
    }

    #[test]
    fn test_tasks_are_disjoint() {
        let root = Path::new("/work");
        let a = TaskWorkspace::new(root, "job", 1);
        let b = TaskWorkspace::new(root, "job", 11);
        assert!(!a.root().starts_with(b.root()));
        assert!(!b.root().starts_with(a.root()));
    }
}
