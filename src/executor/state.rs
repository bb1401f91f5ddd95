//! Task execution state tracking
//!
//! Tracks the status of every task of a job and validates transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Error, FailureKind, Result};
use crate::types::{TaskId, TaskStatus};

// ─────────────────────────────────────────────────────────────────
// Task Record
// ─────────────────────────────────────────────────────────────────

/// Why a task failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Tracked state of one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,

    pub status: TaskStatus,

    /// Exit code of the command, once it has exited
    pub exit_code: Option<i32>,

    pub failure: Option<TaskFailure>,

    /// When localization started
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            exit_code: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn enter(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "task {}: illegal transition {} -> {}",
                self.task_id, self.status, next
            )));
        }
        let now = Utc::now();
        if next == TaskStatus::Localizing {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Milliseconds from start to finish, or so far
    pub fn duration_ms(&self) -> Option<i64> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds())
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Tracker
// ─────────────────────────────────────────────────────────────────

/// Status of all tasks of one job
pub struct TaskTracker {
    tasks: RwLock<BTreeMap<TaskId, TaskRecord>>,
}

impl TaskTracker {
    /// Track the given tasks, all pending
    pub fn new(task_ids: impl IntoIterator<Item = TaskId>) -> Self {
        let tasks = task_ids
            .into_iter()
            .map(|id| (id, TaskRecord::new(id)))
            .collect();
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// Move a task to `next`, rejecting illegal transitions
    pub fn transition(&self, task_id: TaskId, next: TaskStatus) -> Result<()> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::Internal(format!("unknown task {}", task_id)))?;
        record.enter(next)
    }

    /// Record the command's exit code
    pub fn set_exit_code(&self, task_id: TaskId, code: i32) {
        if let Some(record) = self.tasks.write().get_mut(&task_id) {
            record.exit_code = Some(code);
        }
    }

    /// Mark a task failed with the error that stopped it
    ///
    /// Returns false if the task was already terminal.
    pub fn mark_failed(&self, task_id: TaskId, error: &Error) -> bool {
        let mut tasks = self.tasks.write();
        let Some(record) = tasks.get_mut(&task_id) else {
            return false;
        };
        if record.enter(TaskStatus::Failed).is_err() {
            return false;
        }
        if let Error::CommandExecution {
            exit_code: Some(code),
            ..
        } = error
        {
            record.exit_code = Some(*code);
        }
        record.failure = Some(TaskFailure {
            kind: error.failure_kind(),
            message: error.to_string(),
        });
        true
    }

    /// Copy of every record, ordered by task id
    pub fn records(&self) -> Vec<TaskRecord> {
        self.tasks.read().values().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to(tracker: &TaskTracker, task_id: TaskId, path: &[TaskStatus]) {
        for status in path {
            tracker.transition(task_id, *status).unwrap();
        }
    }

    #[test]
    fn test_lifecycle() {
        let tracker = TaskTracker::new([1, 2]);
        assert!(tracker.records().iter().all(|r| r.status == TaskStatus::Pending));

        run_to(
            &tracker,
            1,
            &[TaskStatus::Localizing, TaskStatus::Running],
        );
        assert_eq!(tracker.records()[0].status, TaskStatus::Running);
        assert!(tracker.records()[0].duration_ms().is_some());
        assert!(tracker.records()[1].duration_ms().is_none());
        tracker.set_exit_code(1, 0);
        run_to(&tracker, 1, &[TaskStatus::Delocalizing, TaskStatus::Succeeded]);

        let record = &tracker.records()[0];
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.started_at.is_some());
        assert!(record.finished_at >= record.started_at);
        assert!(record.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let tracker = TaskTracker::new([1]);
        assert!(tracker.transition(1, TaskStatus::Running).is_err());
        assert!(tracker.transition(1, TaskStatus::Succeeded).is_err());
        assert!(tracker.transition(9, TaskStatus::Localizing).is_err());
        assert_eq!(tracker.records()[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_mark_failed_records_cause() {
        let tracker = TaskTracker::new([1]);
        run_to(&tracker, 1, &[TaskStatus::Localizing, TaskStatus::Running]);

        let err = Error::CommandExecution {
            task_id: 1,
            exit_code: Some(2),
            message: "exit code 2".into(),
        };
        assert!(tracker.mark_failed(1, &err));

        let record = &tracker.records()[0];
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.exit_code, Some(2));
        let failure = record.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::CommandExecution);
        assert!(failure.message.contains("exit code 2"));
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_terminal_states_absorb() {
        let tracker = TaskTracker::new([1, 2]);
        run_to(
            &tracker,
            1,
            &[
                TaskStatus::Localizing,
                TaskStatus::Running,
                TaskStatus::Delocalizing,
                TaskStatus::Succeeded,
            ],
        );
        assert!(!tracker.mark_failed(1, &Error::Cancelled { task_id: 1 }));
        assert_eq!(tracker.records()[0].status, TaskStatus::Succeeded);

        // Pending tasks can be failed directly on cancellation
        assert!(tracker.mark_failed(2, &Error::Cancelled { task_id: 2 }));
        assert!(!tracker.mark_failed(2, &Error::Cancelled { task_id: 2 }));
        assert_eq!(tracker.records()[1].status, TaskStatus::Failed);
        assert!(tracker.records()[1].started_at.is_none());
    }
}
