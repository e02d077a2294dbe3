//! Typed handles to tasks scheduled on an `OperationQueue`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::core::task::TaskId;

/// A task's identity, its output slot and its cancellation token.
///
/// The queue writes the output once, when the body succeeds. Handles are
/// cheap to clone and may outlive the queue.
pub struct TaskHandle<T> {
    id: TaskId,
    output: Arc<Mutex<Option<T>>>,
    cancel: CancellationToken,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, cancel: CancellationToken) -> Self {
        Self {
            id,
            output: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel this task only. Dependents are not cancelled; they see the
    /// cancellation through their preconditions.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_output(&self) -> bool {
        self.slot().is_some()
    }

    /// Remove the output, leaving the slot empty.
    pub fn take_output(&self) -> Option<T> {
        self.slot().take()
    }

    pub(crate) fn store(&self, value: T) {
        *self.slot() = Some(value);
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        // A poisoned slot only means a body panicked mid-write elsewhere; the
        // Option inside is still coherent.
        self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Copy of the output, if the task finished successfully.
    pub fn output(&self) -> Option<T> {
        self.slot().clone()
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            output: Arc::clone(&self.output),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
