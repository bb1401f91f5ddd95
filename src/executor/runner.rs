//! Task runner
//!
//! Runs a task's command as a child process inside its workspace with the
//! parameter bindings exported as environment variables.

use std::fs::File;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TaskWorkspace;
use crate::error::{Error, Result};
use crate::types::{TaskCommand, TaskDescriptor, TaskId};

/// Runs task commands for one job
#[derive(Debug, Clone)]
pub struct TaskRunner {
    job_id: String,
    timeout: Option<Duration>,
}

impl TaskRunner {
    /// Create a runner; `timeout` bounds each command's wall-clock time
    pub fn new(job_id: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            job_id: job_id.into(),
            timeout,
        }
    }

    /// Run the task's command and wait for it
    ///
    /// Returns the exit code, which is always 0: a non-zero exit, a signal,
    /// a failure to start, a timeout or cancellation are all errors. On
    /// timeout and on cancellation the child's whole process group is killed.
    pub async fn run(
        &self,
        task: &TaskDescriptor,
        workspace: &TaskWorkspace,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let task_id = task.task_id;
        let mut command = self.build_command(task, workspace)?;

        let mut child = command.spawn().map_err(|e| Error::CommandExecution {
            task_id,
            exit_code: None,
            message: format!("failed to start '{}': {}", task.command.shell(), e),
        })?;
        info!(
            job_id = %self.job_id,
            task_id,
            pid = child.id().unwrap_or_default(),
            command = %task.command.summary(),
            "Command started"
        );

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| Error::CommandExecution {
                    task_id,
                    exit_code: None,
                    message: format!("failed to wait for command: {}", e),
                })?;
                check_status(task_id, status)
            }
            _ = cancel.cancelled() => {
                kill(&mut child, task_id).await;
                Err(Error::Cancelled { task_id })
            }
            _ = deadline => {
                kill(&mut child, task_id).await;
                Err(Error::TaskTimeout {
                    task_id,
                    timeout_secs: timeout.map(|t| t.as_secs()).unwrap_or_default(),
                })
            }
        }
    }

    fn build_command(&self, task: &TaskDescriptor, workspace: &TaskWorkspace) -> Result<Command> {
        let mut command = match &*task.command {
            TaskCommand::Inline { shell, text } => {
                let mut command = Command::new(shell);
                command.arg("-c").arg(text);
                command
            }
            TaskCommand::Script { shell, location } => {
                let mut command = Command::new(shell);
                command.arg(workspace.script_path(location));
                command
            }
        };

        let stdout = create_log(&workspace.stdout_log())?;
        let stderr = create_log(&workspace.stderr_log())?;

        command
            .current_dir(workspace.root())
            .env("JOB_ID", &self.job_id)
            .env("TASK_ID", task.task_id.to_string())
            .env("TMPDIR", workspace.tmp_dir())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        // Own process group, so everything the command starts can be killed
        #[cfg(unix)]
        command.process_group(0);

        // Bindings are applied last so they override the built-ins
        for param in &task.params {
            match param.env_value() {
                Some(value) => {
                    command.env(&param.name, value);
                }
                None => {
                    return Err(Error::Internal(format!(
                        "parameter {} has no local path",
                        param.name
                    )))
                }
            }
        }

        Ok(command)
    }
}

fn create_log(path: &std::path::Path) -> Result<File> {
    File::create(path).map_err(|e| Error::IoWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

fn check_status(task_id: TaskId, status: ExitStatus) -> Result<i32> {
    match status.code() {
        Some(0) => {
            debug!(task_id, "Command exited cleanly");
            Ok(0)
        }
        Some(code) => Err(Error::CommandExecution {
            task_id,
            exit_code: Some(code),
            message: format!("exit code {}", code),
        }),
        None => Err(Error::CommandExecution {
            task_id,
            exit_code: None,
            message: signal_message(&status),
        }),
    }
}

#[cfg(unix)]
fn signal_message(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("terminated by signal {}", signal),
        None => "terminated without an exit code".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_message(_status: &ExitStatus) -> String {
    "terminated without an exit code".to_string()
}

/// Kill the command and everything it started, then reap it
async fn kill(child: &mut Child, task_id: TaskId) {
    kill_group(child, task_id);

    if let Err(e) = child.kill().await {
        warn!(task_id, error = %e, "Failed to kill command");
    } else {
        info!(task_id, "Command killed");
    }
}

#[cfg(unix)]
fn kill_group(child: &Child, task_id: TaskId) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created at spawn
    if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
        let e = std::io::Error::last_os_error();
        debug!(task_id, pid, error = %e, "Failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child, _task_id: TaskId) {}
