//! Task records tracked by the execution graph.
//!
//! A `Task` is bookkeeping only: identity, name, schedule position, status
//! and timing. The async body that does the work lives in the
//! `OperationQueue` until the task is dispatched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Unique identifier for a task within an operation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID, for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a task is in its lifecycle.
///
/// `Finished`, `Failed` and `Cancelled` are terminal. Once a task is
/// terminal its status never changes again.
#[derive(Debug, Clone, Default)]
pub enum TaskStatus {
    /// Scheduled, waiting for its dependencies.
    #[default]
    Pending,
    /// Body is executing.
    Running,
    /// Body returned successfully.
    Finished,
    /// Body returned an error, or its input could not be assembled.
    Failed { error: Error },
    /// Never ran (or was interrupted): cancelled directly, or vetoed by a precondition.
    Cancelled { reason: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Failed { .. } | TaskStatus::Cancelled { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskStatus::Cancelled { .. })
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            TaskStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Finished => write!(f, "finished"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Cancelled { reason } => write!(f, "cancelled: {}", reason),
        }
    }
}

/// A single node of the execution graph.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Position in schedule order; used to break ties when reporting errors.
    pub sequence: usize,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: &str, sequence: usize) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            sequence,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        self.settle(TaskStatus::Finished);
    }

    pub fn fail(&mut self, error: Error) {
        self.settle(TaskStatus::Failed { error });
    }

    pub fn cancel(&mut self, reason: &str) {
        self.settle(TaskStatus::Cancelled {
            reason: reason.to_string(),
        });
    }

    fn settle(&mut self, status: TaskStatus) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }
}
