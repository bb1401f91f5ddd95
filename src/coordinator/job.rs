//! Job dispatch
//!
//! Runs every task of a job through localize, run and delocalize with
//! bounded parallelism, and tracks their status for [`JobHandle`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::JobResult;
use crate::error::{Error, Result};
use crate::executor::{
    Delocalizer, Localizer, TaskRecord, TaskRunner, TaskTracker, TaskWorkspace,
};
use crate::storage::StoreRegistry;
use crate::types::{Location, TaskDescriptor, TaskId, TaskStatus};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the job coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Root under which task workspaces are created
    pub working_root: PathBuf,

    /// Maximum tasks in flight (0 = number of CPUs)
    pub max_parallel_tasks: usize,

    /// Wall-clock limit per command
    pub task_timeout: Option<Duration>,

    /// First delay between status polls in `wait`
    pub poll_initial: Duration,

    /// Upper bound on the delay between polls
    pub poll_max: Duration,

    pub poll_multiplier: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            working_root: std::env::temp_dir().join("batchwork"),
            max_parallel_tasks: 0,
            task_timeout: None,
            poll_initial: Duration::from_millis(100),
            poll_max: Duration::from_secs(2),
            poll_multiplier: 1.5,
        }
    }
}

impl CoordinatorConfig {
    /// Effective number of concurrent tasks
    pub fn parallelism(&self) -> usize {
        if self.max_parallel_tasks == 0 {
            num_cpus::get()
        } else {
            self.max_parallel_tasks
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Job Spec
// ─────────────────────────────────────────────────────────────────

/// A job ready to submit
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub tasks: Vec<TaskDescriptor>,

    /// Where task logs are uploaded once each task finishes
    pub logging: Option<Location>,
}

impl JobSpec {
    /// Job with a freshly generated id
    pub fn new(tasks: Vec<TaskDescriptor>) -> Self {
        Self {
            job_id: new_job_id(),
            tasks,
            logging: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_logging(mut self, logging: Option<Location>) -> Self {
        self.logging = logging;
        self
    }
}

/// Generate a short unique job id
pub fn new_job_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("job-{}", &id[..8])
}

// ─────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────

/// Dispatches jobs
pub struct JobCoordinator {
    config: CoordinatorConfig,
    stores: Arc<StoreRegistry>,
}

impl JobCoordinator {
    pub fn new(config: CoordinatorConfig, stores: Arc<StoreRegistry>) -> Self {
        Self { config, stores }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Start every task of `spec` and return immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        if spec.tasks.is_empty() {
            return Err(Error::Internal(format!("job {} has no tasks", spec.job_id)));
        }
        let mut ids: Vec<TaskId> = spec.tasks.iter().map(|t| t.task_id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Internal(format!(
                "job {} has duplicate task ids",
                spec.job_id
            )));
        }

        let tracker = Arc::new(TaskTracker::new(ids));
        let cancel = CancellationToken::new();
        let parallelism = self.config.parallelism();

        let dispatch = Arc::new(Dispatch {
            job_id: spec.job_id.clone(),
            working_root: self.config.working_root.clone(),
            logging: spec.logging,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
            permits: Arc::new(Semaphore::new(parallelism)),
            stores: self.stores.clone(),
            localizer: Localizer::new(self.stores.clone()),
            runner: TaskRunner::new(spec.job_id.clone(), self.config.task_timeout),
            delocalizer: Delocalizer::new(self.stores.clone()),
        });

        info!(
            job_id = %spec.job_id,
            tasks = spec.tasks.len(),
            parallelism,
            working_root = %self.config.working_root.display(),
            "Job submitted"
        );

        let handles: Vec<_> = spec
            .tasks
            .into_iter()
            .map(|task| {
                let task_id = task.task_id;
                (task_id, tokio::spawn(dispatch.clone().run_task(task)))
            })
            .collect();

        // A panicking task must still end up terminal so `wait` returns
        let supervisor = dispatch.clone();
        let settled = Arc::new(AtomicBool::new(false));
        let settled_flag = settled.clone();
        tokio::spawn(async move {
            for (task_id, handle) in handles {
                if let Err(e) = handle.await {
                    error!(job_id = %supervisor.job_id, task_id, error = %e, "Task aborted");
                    supervisor
                        .tracker
                        .mark_failed(task_id, &Error::Internal(format!("task aborted: {}", e)));
                }
            }
            settled_flag.store(true, Ordering::Release);
            debug!(job_id = %supervisor.job_id, "All tasks finished");
        });

        Ok(JobHandle {
            job_id: spec.job_id,
            tracker,
            cancel,
            settled,
            poll_initial: self.config.poll_initial,
            poll_max: self.config.poll_max,
            poll_multiplier: self.config.poll_multiplier,
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Per-task Dispatch
// ─────────────────────────────────────────────────────────────────

/// State shared by every task future of one job
struct Dispatch {
    job_id: String,
    working_root: PathBuf,
    logging: Option<Location>,
    tracker: Arc<TaskTracker>,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    stores: Arc<StoreRegistry>,
    localizer: Localizer,
    runner: TaskRunner,
    delocalizer: Delocalizer,
}

impl Dispatch {
    async fn run_task(self: Arc<Self>, mut task: TaskDescriptor) {
        let task_id = task.task_id;

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            self.fail(&mut task, Error::Cancelled { task_id });
            return;
        };

        let workspace = TaskWorkspace::new(&self.working_root, &self.job_id, task_id);
        match self.execute(&mut task, &workspace).await {
            Ok(()) => info!(job_id = %self.job_id, task_id, "Task succeeded"),
            Err(e) => {
                warn!(job_id = %self.job_id, task_id, error = %e.format_for_log(), "Task failed");
                self.fail(&mut task, e);
            }
        }

        if let Some(logging) = &self.logging {
            self.upload_logs(task_id, &workspace, logging).await;
        }
    }

    async fn execute(&self, task: &mut TaskDescriptor, workspace: &TaskWorkspace) -> Result<()> {
        let task_id = task.task_id;

        self.advance(task, TaskStatus::Localizing)?;
        self.localizer.localize(task, workspace).await?;
        self.localizer
            .prepare_outputs(task)
            .await
            .map_err(|e| Error::localization(task_id, e))?;
        self.check_cancelled(task_id)?;

        self.advance(task, TaskStatus::Running)?;
        let exit_code = self.runner.run(task, workspace, &self.cancel).await?;
        self.tracker.set_exit_code(task_id, exit_code);
        self.check_cancelled(task_id)?;

        self.advance(task, TaskStatus::Delocalizing)?;
        self.delocalizer.delocalize(task).await?;

        self.advance(task, TaskStatus::Succeeded)
    }

    fn check_cancelled(&self, task_id: TaskId) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled { task_id });
        }
        Ok(())
    }

    fn advance(&self, task: &mut TaskDescriptor, next: TaskStatus) -> Result<()> {
        task.set_status(next)?;
        self.tracker.transition(task.task_id, next)?;
        debug!(job_id = %self.job_id, task_id = task.task_id, status = %next, "Task status");
        Ok(())
    }

    fn fail(&self, task: &mut TaskDescriptor, err: Error) {
        if task.set_status(TaskStatus::Failed).is_err() {
            debug!(task_id = task.task_id, status = %task.status(), "Task already terminal");
        }
        self.tracker.mark_failed(task.task_id, &err);
    }

    /// Upload stdout/stderr logs; failures are logged only
    async fn upload_logs(&self, task_id: TaskId, workspace: &TaskWorkspace, logging: &Location) {
        let store = match self.stores.for_location(logging) {
            Ok(store) => store,
            Err(e) => {
                warn!(task_id, error = %e, "Cannot upload task logs");
                return;
            }
        };
        let (stdout_uri, stderr_uri) = log_uris(logging, &self.job_id, task_id);
        for (local, uri) in [
            (workspace.stdout_log(), stdout_uri),
            (workspace.stderr_log(), stderr_uri),
        ] {
            if !local.is_file() {
                continue;
            }
            match store.upload(&local, &uri).await {
                Ok(()) => debug!(task_id, uri = %uri, "Task log uploaded"),
                Err(e) => warn!(task_id, uri = %uri, error = %e, "Task log upload failed"),
            }
        }
    }
}

/// Destinations of a task's stdout and stderr logs
///
/// A directory location gets `<job>.<task>-stdout.log`; a `.log` file
/// location `<base>.log` gets `<base>-stdout.log`.
pub fn log_uris(logging: &Location, job_id: &str, task_id: TaskId) -> (String, String) {
    let base = if logging.is_directory() {
        logging.child(&format!("{}.{}", job_id, task_id))
    } else {
        let uri = logging.uri();
        uri.strip_suffix(".log").unwrap_or(uri).to_string()
    };
    (format!("{}-stdout.log", base), format!("{}-stderr.log", base))
}

// ─────────────────────────────────────────────────────────────────
// Job Handle
// ─────────────────────────────────────────────────────────────────

/// Handle to a submitted job
#[derive(Clone)]
pub struct JobHandle {
    job_id: String,
    tracker: Arc<TaskTracker>,
    cancel: CancellationToken,
    /// Set once every task future has returned, log uploads included
    settled: Arc<AtomicBool>,
    poll_initial: Duration,
    poll_max: Duration,
    poll_multiplier: f64,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Current state of every task
    pub fn status(&self) -> Vec<TaskRecord> {
        self.tracker.records()
    }

    /// True once every task is terminal and its logs are uploaded
    pub fn is_finished(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Cancel every task that has not finished
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!(job_id = %self.job_id, "Cancelling job");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until every task is terminal and its logs are uploaded
    ///
    /// Polls the supervisor's flag with bounded backoff; the task join
    /// handles belong to the supervisor, and a cloned handle can wait too.
    pub async fn wait(&self) -> JobResult {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.poll_initial,
            max_interval: self.poll_max,
            multiplier: self.poll_multiplier,
            max_elapsed_time: None,
            ..Default::default()
        };

        while !self.is_finished() {
            let delay = backoff.next_backoff().unwrap_or(self.poll_max);
            tokio::time::sleep(delay).await;
        }

        let result = JobResult::new(self.job_id.clone(), self.tracker.records());
        info!(
            job_id = %self.job_id,
            success = result.success,
            failed = result.failed_count(),
            "Job finished"
        );
        result
    }

    /// Wait at most `timeout`, cancelling the job if it is still running
    pub async fn wait_with_timeout(&self, timeout: Duration) -> JobResult {
        tokio::select! {
            result = self.wait() => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(job_id = %self.job_id, timeout_secs = timeout.as_secs(), "Wait timed out");
                self.cancel();
                self.wait().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::PathResolver;
    use crate::storage::MemoryStore;
    use crate::types::{FileProvider, TaskCommand};
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir, max_parallel_tasks: usize) -> (Arc<MemoryStore>, JobCoordinator) {
        let store = Arc::new(MemoryStore::new(FileProvider::Gcs));
        let registry = Arc::new(StoreRegistry::new());
        registry.register(store.clone());
        let config = CoordinatorConfig {
            working_root: dir.path().to_path_buf(),
            max_parallel_tasks,
            poll_initial: Duration::from_millis(10),
            poll_max: Duration::from_millis(50),
            ..Default::default()
        };
        (store, JobCoordinator::new(config, registry))
    }

    fn tasks(count: u32, text: &str) -> Vec<TaskDescriptor> {
        let command = Arc::new(TaskCommand::Inline {
            shell: "/bin/sh".into(),
            text: text.into(),
        });
        (1..=count)
            .map(|id| TaskDescriptor::new(id, vec![], vec![], command.clone()))
            .collect()
    }

    #[test]
    fn test_job_id_format() {
        let id = new_job_id();
        assert!(id.starts_with("job-"));
        assert_eq!(id.len(), 12);
        assert_ne!(id, new_job_id());
    }

    #[test]
    fn test_parallelism_defaults_to_cpus() {
        assert_eq!(CoordinatorConfig::default().parallelism(), num_cpus::get());
        let config = CoordinatorConfig {
            max_parallel_tasks: 3,
            ..Default::default()
        };
        assert_eq!(config.parallelism(), 3);
    }

    #[test]
    fn test_log_uris() {
        let resolver = PathResolver::default();
        let dir = resolver.resolve_logging("gs://bucket/logs/").unwrap();
        assert_eq!(
            log_uris(&dir, "job-1", 2),
            (
                "gs://bucket/logs/job-1.2-stdout.log".to_string(),
                "gs://bucket/logs/job-1.2-stderr.log".to_string()
            )
        );

        let file = resolver.resolve_logging("gs://bucket/logs/run.log").unwrap();
        assert_eq!(log_uris(&file, "job-1", 2).0, "gs://bucket/logs/run-stdout.log");
    }

    #[tokio::test]
    async fn test_empty_job_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir, 1);
        assert!(coordinator.submit(JobSpec::new(vec![])).is_err());
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir, 2);
        let handle = coordinator
            .submit(JobSpec::new(tasks(3, "echo $TASK_ID")).with_job_id("job-ok"))
            .unwrap();

        let result = handle.wait().await;
        assert!(result.success);
        assert_eq!(result.tasks.len(), 3);
        for task in &result.tasks {
            assert_eq!(task.status, TaskStatus::Succeeded);
            assert_eq!(task.exit_code, Some(0));
        }
        let log = dir.path().join("job-ok/task-2/logs/stdout.log");
        assert_eq!(std::fs::read_to_string(log).unwrap().trim(), "2");
    }

    #[tokio::test]
    async fn test_failed_task_does_not_affect_others() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir, 0);
        let handle = coordinator
            .submit(JobSpec::new(tasks(3, "test $TASK_ID -ne 2")))
            .unwrap();

        let result = handle.wait().await;
        assert!(!result.success);
        assert_eq!(result.task(1).unwrap().status, TaskStatus::Succeeded);
        assert_eq!(result.task(2).unwrap().status, TaskStatus::Failed);
        assert_eq!(result.task(2).unwrap().exit_code, Some(1));
        assert_eq!(result.task(3).unwrap().status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_logs_uploaded_after_failure() {
        let dir = TempDir::new().unwrap();
        let (store, coordinator) = coordinator(&dir, 1);
        let logging = PathResolver::default().resolve_logging("gs://bucket/logs/").unwrap();
        let handle = coordinator
            .submit(
                JobSpec::new(tasks(1, "echo out; echo err >&2; exit 4"))
                    .with_job_id("job-logs")
                    .with_logging(Some(logging)),
            )
            .unwrap();

        let result = handle.wait().await;
        assert!(!result.success);
        assert_eq!(store.get("gs://bucket/logs/job-logs.1-stdout.log").unwrap(), b"out\n");
        assert_eq!(store.get("gs://bucket/logs/job-logs.1-stderr.log").unwrap(), b"err\n");
    }

    #[tokio::test]
    async fn test_cancel_marks_every_task_failed() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir, 1);
        let handle = coordinator.submit(JobSpec::new(tasks(3, "sleep 30"))).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), handle.wait())
            .await
            .unwrap();

        assert!(!result.success);
        for task in &result.tasks {
            assert_eq!(task.status, TaskStatus::Failed);
            assert_eq!(task.failure_kind, Some(crate::error::FailureKind::Cancelled));
        }
        // Only the first task ever got a permit
        assert!(result.task(3).unwrap().started_at.is_none());
    }

    #[tokio::test]
    async fn test_wait_with_timeout_cancels() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir, 2);
        let handle = coordinator.submit(JobSpec::new(tasks(2, "sleep 30"))).unwrap();

        let result = handle.wait_with_timeout(Duration::from_millis(300)).await;
        assert!(handle.is_cancelled());
        assert!(!result.success);
        assert!(handle.is_finished());
    }
}
