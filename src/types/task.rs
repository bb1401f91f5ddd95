//! Task descriptors and the per-task state machine

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{Label, Location, ParameterBinding};

/// 1-based ordinal of a task within its job
pub type TaskId = u32;

// ─────────────────────────────────────────────────────────────────
// Task Status
// ─────────────────────────────────────────────────────────────────

/// Lifecycle state of a task
///
/// `Pending -> Localizing -> Running -> Delocalizing -> Succeeded`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Localizing,
    Running,
    Delocalizing,
    Succeeded,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl TaskStatus {
    /// Whether the task can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Localizing)
                | (Localizing, Running)
                | (Running, Delocalizing)
                | (Delocalizing, Succeeded)
                | (Pending | Localizing | Running | Delocalizing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Localizing => "localizing",
            TaskStatus::Running => "running",
            TaskStatus::Delocalizing => "delocalizing",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Command
// ─────────────────────────────────────────────────────────────────

/// What a task runs, shared by every task of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// Inline command text run with `<shell> -c`
    Inline { shell: String, text: String },
    /// Script file copied into the task and run with `<shell> <script>`
    Script { shell: String, location: Location },
}

impl TaskCommand {
    pub fn shell(&self) -> &str {
        match self {
            TaskCommand::Inline { shell, .. } | TaskCommand::Script { shell, .. } => shell,
        }
    }

    /// Short human-readable form for logs
    pub fn summary(&self) -> String {
        match self {
            TaskCommand::Inline { text, .. } => {
                let first = text.lines().next().unwrap_or_default();
                if first.chars().count() > 60 || text.lines().count() > 1 {
                    format!("{}...", first.chars().take(60).collect::<String>())
                } else {
                    first.to_string()
                }
            }
            TaskCommand::Script { location, .. } => location.uri().to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Descriptor
// ─────────────────────────────────────────────────────────────────

/// Everything needed to run one task
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub task_id: TaskId,

    /// Bindings in declaration order
    pub params: Vec<ParameterBinding>,

    pub labels: Vec<Label>,

    pub command: Arc<TaskCommand>,

    status: TaskStatus,
}

impl TaskDescriptor {
    /// Create a pending task
    pub fn new(
        task_id: TaskId,
        params: Vec<ParameterBinding>,
        labels: Vec<Label>,
        command: Arc<TaskCommand>,
    ) -> Self {
        Self {
            task_id,
            params,
            labels,
            command,
            status: TaskStatus::Pending,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Move to `next`, rejecting transitions the state machine forbids
    pub(crate) fn set_status(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "task {}: illegal transition {} -> {}",
                self.task_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Look up a binding by name
    pub fn param(&self, name: &str) -> Option<&ParameterBinding> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn input_files(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.params.iter().filter(|p| p.is_input_file())
    }

    pub fn output_files(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.params.iter().filter(|p| p.is_output_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(text: &str) -> Arc<TaskCommand> {
        Arc::new(TaskCommand::Inline {
            shell: "/bin/bash".into(),
            text: text.into(),
        })
    }

    #[test]
    fn test_status_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Localizing));
        assert!(Localizing.can_transition_to(Running));
        assert!(Running.can_transition_to(Delocalizing));
        assert!(Delocalizing.can_transition_to(Succeeded));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Running));
        assert!(!Running.can_transition_to(Succeeded));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Delocalizing.is_terminal());
    }

    #[test]
    fn test_descriptor_status() {
        let mut task = TaskDescriptor::new(1, vec![], vec![], inline("true"));
        assert_eq!(task.status(), TaskStatus::Pending);
        task.set_status(TaskStatus::Localizing).unwrap();
        assert!(task.set_status(TaskStatus::Succeeded).is_err());
        task.set_status(TaskStatus::Failed).unwrap();
        assert!(task.set_status(TaskStatus::Running).is_err());
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_param_lookup() {
        let task = TaskDescriptor::new(
            3,
            vec![ParameterBinding::literal("SAMPLE", "NA12878")],
            vec![],
            inline("echo $SAMPLE"),
        );
        assert_eq!(task.param("SAMPLE").unwrap().value, "NA12878");
        assert!(task.param("OTHER").is_none());
        assert_eq!(task.input_files().count(), 0);
    }

    #[test]
    fn test_command_summary() {
        assert_eq!(inline("echo hi").summary(), "echo hi");
        assert_eq!(inline("a\nb").summary(), "a...");
    }
}
