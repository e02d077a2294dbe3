//! Preconditions evaluated right before a task would start.
//!
//! A condition sees the terminal state of every direct dependency. If it
//! vetoes, the queue cancels the task without running its body, and that
//! cancellation is in turn visible to the task's own dependents.

use crate::core::task::Task;

pub trait Condition: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// `true` lets the task run.
    fn evaluate(&self, dependencies: &[&Task]) -> bool;
}

/// Vetoes when any dependency failed, and optionally when any was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoFailedDependencies {
    pub ignore_cancellations: bool,
}

impl NoFailedDependencies {
    pub fn new(ignore_cancellations: bool) -> Self {
        Self {
            ignore_cancellations,
        }
    }
}

impl Default for NoFailedDependencies {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Condition for NoFailedDependencies {
    fn name(&self) -> &str {
        "no-failed-dependencies"
    }

    fn evaluate(&self, dependencies: &[&Task]) -> bool {
        dependencies.iter().all(|dep| {
            if dep.status.is_failed() {
                return false;
            }
            self.ignore_cancellations || !dep.status.is_cancelled()
        })
    }
}

/// Ad-hoc gate backed by a closure.
pub struct BlockCondition<F> {
    name: String,
    block: F,
}

impl<F> BlockCondition<F>
where
    F: Fn(&[&Task]) -> bool + Send + Sync,
{
    pub fn new(name: &str, block: F) -> Self {
        Self {
            name: name.to_string(),
            block,
        }
    }
}

impl<F> Condition for BlockCondition<F>
where
    F: Fn(&[&Task]) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, dependencies: &[&Task]) -> bool {
        (self.block)(dependencies)
    }
}
