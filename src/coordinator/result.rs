//! Job results

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, FailureKind, Result};
use crate::executor::TaskRecord;
use crate::types::{TaskId, TaskStatus};

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub failure_kind: Option<FailureKind>,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Milliseconds from localization start to the terminal state
    pub duration_ms: Option<i64>,
}

impl From<TaskRecord> for TaskOutcome {
    fn from(record: TaskRecord) -> Self {
        let duration_ms = record.duration_ms();
        let (failure_kind, message) = match record.failure {
            Some(failure) => (Some(failure.kind), Some(failure.message)),
            None => (None, None),
        };
        Self {
            task_id: record.task_id,
            status: record.status,
            exit_code: record.exit_code,
            failure_kind,
            message,
            started_at: record.started_at,
            finished_at: record.finished_at,
            duration_ms,
        }
    }
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Outcome of a whole job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: String,

    /// Per-task outcomes ordered by task id
    pub tasks: Vec<TaskOutcome>,

    /// True only if every task succeeded
    pub success: bool,
}

impl JobResult {
    pub fn new(job_id: impl Into<String>, records: Vec<TaskRecord>) -> Self {
        let tasks: Vec<TaskOutcome> = records.into_iter().map(TaskOutcome::from).collect();
        let success = tasks.iter().all(TaskOutcome::succeeded);
        Self {
            job_id: job_id.into(),
            tasks,
            success,
        }
    }

    pub fn task(&self, task_id: TaskId) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.succeeded()).count()
    }

    /// `JobFailed` unless every task succeeded
    pub fn ensure_success(&self) -> Result<()> {
        if self.success {
            return Ok(());
        }
        Err(Error::JobFailed {
            job_id: self.job_id.clone(),
            failed: self.failed_count(),
            total: self.tasks.len(),
        })
    }

    /// Human-readable per-task table
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Job {}", self.job_id);
        let _ = writeln!(
            out,
            "{:<6} {:<12} {:<6} {:<9} {}",
            "TASK", "STATUS", "EXIT", "TIME", "DETAIL"
        );
        for task in &self.tasks {
            let exit = task
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            let time = task
                .duration_ms
                .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
                .unwrap_or_else(|| "-".to_string());
            let detail = match (&task.failure_kind, &task.message) {
                (Some(kind), Some(message)) => format!("{}: {}", kind, message),
                (Some(kind), None) => kind.to_string(),
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "{:<6} {:<12} {:<6} {:<9} {}",
                task.task_id,
                task.status.as_str(),
                exit,
                time,
                detail
            );
        }
        let _ = writeln!(
            out,
            "{} of {} tasks succeeded",
            self.tasks.len() - self.failed_count(),
            self.tasks.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskTracker;

    fn finished_tracker() -> TaskTracker {
        let tracker = TaskTracker::new([1, 2]);
        for status in [
            TaskStatus::Localizing,
            TaskStatus::Running,
            TaskStatus::Delocalizing,
            TaskStatus::Succeeded,
        ] {
            tracker.transition(1, status).unwrap();
        }
        tracker.set_exit_code(1, 0);
        tracker.transition(2, TaskStatus::Localizing).unwrap();
        tracker.transition(2, TaskStatus::Running).unwrap();
        tracker.mark_failed(
            2,
            &Error::CommandExecution {
                task_id: 2,
                exit_code: Some(1),
                message: "exit code 1".into(),
            },
        );
        tracker
    }

    #[test]
    fn test_success_requires_every_task() {
        let result = JobResult::new("job-1", finished_tracker().records());
        assert!(!result.success);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.task(2).unwrap().failure_kind, Some(FailureKind::CommandExecution));

        let err = result.ensure_success().unwrap_err();
        assert_eq!(err.to_string(), "Job job-1: 1 of 2 tasks failed");
    }

    #[test]
    fn test_render_table() {
        let table = JobResult::new("job-1", finished_tracker().records()).render_table();
        assert!(table.contains("Job job-1"));
        assert!(table.lines().nth(1).unwrap().contains("TIME"));
        let row: Vec<&str> = table.lines().nth(2).unwrap().split_whitespace().collect();
        assert_eq!(row[..3], ["1", "succeeded", "0"]);
        assert!(row[3].ends_with('s'));
        assert!(table.contains("succeeded"));
        assert!(table.contains("CommandExecutionError"));
        assert!(table.ends_with("1 of 2 tasks succeeded\n"));
    }

    #[test]
    fn test_json_shape() {
        let result = JobResult::new("job-1", finished_tracker().records());
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["success"], false);
        assert_eq!(json["tasks"][0]["status"], "succeeded");
        assert_eq!(json["tasks"][1]["failure_kind"], "command_execution");
        assert_eq!(json["tasks"][1]["exit_code"], 1);
        assert!(json["tasks"][0]["duration_ms"].as_i64().unwrap() >= 0);
    }
}
