//! Operation queue: runs a graph of async tasks.
//!
//! The queue owns a `TaskDAG` plus, per task, the async body, the
//! preconditions and the binding sources. `run` dispatches every task whose
//! dependencies are terminal, evaluates its preconditions, and spawns the
//! body on the tokio runtime. Tasks without a dependency path between them
//! run concurrently. When `run` returns, every task is terminal.
//!
//! Cancellation is cooperative. The queue has a root `CancellationToken`
//! and every task a child token. Cancelling the root cancels every task
//! that has not reached a terminal state; cancelling a single task's handle
//! affects only that task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::core::binding::{Bindings, PartialInput};
use crate::core::condition::Condition;
use crate::core::dag::TaskDAG;
use crate::core::handle::TaskHandle;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::{olog_debug, olog_trace, olog_warn};

/// Events emitted while the queue runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    TaskStarted { task_id: TaskId, name: String },
    TaskFinished { task_id: TaskId, name: String },
    TaskFailed { task_id: TaskId, name: String, error: String },
    TaskCancelled { task_id: TaskId, name: String, reason: String },
    /// Every task is terminal; `run` is about to return.
    AllTasksTerminal,
}

/// What a running body gets to know about itself.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    name: String,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when this task (or the whole queue) is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

type TaskBody = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, Result<()>> + Send>;

struct Entry {
    body: Option<TaskBody>,
    cancel: CancellationToken,
    conditions: Vec<Arc<dyn Condition>>,
    binding_sources: Vec<TaskId>,
}

enum Admission {
    Run,
    Cancel(String),
}

pub struct OperationQueue {
    dag: TaskDAG,
    entries: HashMap<TaskId, Entry>,
    root: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<QueueEvent>>,
    started: bool,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self {
            dag: TaskDAG::new(),
            entries: HashMap::new(),
            root: CancellationToken::new(),
            event_tx: None,
            started: false,
        }
    }

    /// Queue whose root token is a child of `parent`, so cancelling the
    /// parent operation cancels the whole graph.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            root: parent.child_token(),
            ..Self::new()
        }
    }

    pub fn with_events(mut self, event_tx: mpsc::UnboundedSender<QueueEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Schedule a task with no bound input.
    pub fn add_task<T, F, Fut>(&mut self, name: &str, body: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        debug_assert!(!self.started, "task {} added after the queue ran", name);

        let task = Task::new(name, self.dag.task_count());
        let id = task.id;
        let cancel = self.root.child_token();
        let handle = TaskHandle::new(id, cancel.clone());
        let output = handle.clone();

        let body: TaskBody = Box::new(move |ctx: TaskContext| {
            async move {
                let token = ctx.token().clone();
                let value = body(ctx).await?;
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                output.store(value);
                Ok(())
            }
            .boxed()
        });

        self.dag.add_task(task);
        self.entries.insert(
            id,
            Entry {
                body: Some(body),
                cancel,
                conditions: Vec::new(),
                binding_sources: Vec::new(),
            },
        );
        olog_trace!("OperationQueue: scheduled {} ({})", name, id.short());
        handle
    }

    /// Schedule a task whose input is assembled from upstream outputs.
    ///
    /// Every binding source must also be added as a dependency of the
    /// returned task before `run`. If the input cannot be reduced, the task
    /// fails with `Error::MissingInput` and its body never runs.
    pub fn add_bound_task<P, T, F, Fut>(
        &mut self,
        name: &str,
        bindings: Bindings<P>,
        body: F,
    ) -> TaskHandle<T>
    where
        P: PartialInput,
        T: Send + 'static,
        F: FnOnce(TaskContext, P::Output) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let sources = bindings.sources().to_vec();
        let handle = self.add_task(name, move |ctx| async move {
            let input = bindings.resolve()?;
            body(ctx, input).await
        });
        if let Some(entry) = self.entries.get_mut(&handle.id()) {
            entry.binding_sources = sources;
        }
        handle
    }

    /// `to` will not start before `from` is terminal.
    pub fn add_dependency<A, B>(&mut self, from: &TaskHandle<A>, to: &TaskHandle<B>) -> Result<()> {
        self.dag.add_dependency(&from.id(), &to.id())
    }

    pub fn add_condition<T>(&mut self, task: &TaskHandle<T>, condition: impl Condition + 'static) {
        if let Some(entry) = self.entries.get_mut(&task.id()) {
            entry.conditions.push(Arc::new(condition));
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn cancel(&self) {
        self.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Every task in schedule order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.dag.all_tasks()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.dag.get_task(id)
    }

    pub fn status<T>(&self, handle: &TaskHandle<T>) -> Option<&TaskStatus> {
        self.dag.get_task(&handle.id()).map(|t| &t.status)
    }

    pub fn dag(&self) -> &TaskDAG {
        &self.dag
    }

    pub fn len(&self) -> usize {
        self.dag.task_count()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Run every task and wait until all of them are terminal.
    ///
    /// # Errors
    /// `Error::Validation` if the queue already ran, or if a binding reads
    /// from a task that is not one of the bound task's dependencies. In the
    /// latter case every task is cancelled without running.
    pub async fn run(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::Validation("Operation queue already ran".to_string()));
        }
        self.started = true;

        if let Err(err) = self.validate_bindings() {
            olog_warn!("OperationQueue: refusing to run: {}", err);
            let ids: Vec<TaskId> = self.dag.all_tasks().iter().map(|t| t.id).collect();
            for id in ids {
                self.settle_cancelled(&id, "invalid task graph");
            }
            return Err(err);
        }

        olog_debug!("OperationQueue::run tasks={}", self.dag.task_count());

        let root = self.root.clone();
        let mut running: JoinSet<(TaskId, Result<()>)> = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, TaskId> = HashMap::new();
        let mut cancel_seen = false;

        loop {
            if root.is_cancelled() && !cancel_seen {
                cancel_seen = true;
                olog_debug!("OperationQueue: cancelled, dropping pending tasks");
                let pending: Vec<TaskId> = self
                    .dag
                    .all_tasks()
                    .iter()
                    .filter(|t| t.is_pending())
                    .map(|t| t.id)
                    .collect();
                for id in pending {
                    self.settle_cancelled(&id, "queue cancelled");
                }
            }

            self.dispatch_ready(&mut running, &mut spawned);

            if running.is_empty() {
                break;
            }

            let joined = tokio::select! {
                _ = root.cancelled(), if !cancel_seen => None,
                joined = running.join_next() => joined,
            };

            match joined {
                Some(Ok((id, result))) => self.record(&id, result),
                Some(Err(join_err)) => {
                    if let Some(id) = spawned.get(&join_err.id()).copied() {
                        let error = if join_err.is_panic() {
                            Error::TaskJoin(format!("task panicked: {}", join_err))
                        } else {
                            Error::Cancelled
                        };
                        self.record(&id, Err(error));
                    }
                }
                None => {}
            }
        }

        debug_assert!(self.dag.all_terminal());
        self.emit(QueueEvent::AllTasksTerminal);
        Ok(())
    }

    fn validate_bindings(&self) -> Result<()> {
        for task in self.dag.all_tasks() {
            let Some(entry) = self.entries.get(&task.id) else {
                continue;
            };
            for source in &entry.binding_sources {
                if !self.dag.has_dependency(source, &task.id) {
                    let source_name = self
                        .dag
                        .get_task(source)
                        .map(|t| t.name.clone())
                        .unwrap_or_else(|| source.short());
                    return Err(Error::Validation(format!(
                        "Task {} reads the output of {} without depending on it",
                        task.name, source_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Start or veto every ready task until nothing new becomes ready.
    ///
    /// Vetoing a task makes it terminal, which can make its dependents ready
    /// within the same call.
    fn dispatch_ready(
        &mut self,
        running: &mut JoinSet<(TaskId, Result<()>)>,
        spawned: &mut HashMap<tokio::task::Id, TaskId>,
    ) {
        loop {
            let ready = self.dag.ready_tasks();
            if ready.is_empty() {
                return;
            }

            for id in ready {
                match self.admit(&id) {
                    Admission::Cancel(reason) => self.settle_cancelled(&id, &reason),
                    Admission::Run => self.spawn(&id, running, spawned),
                }
            }
        }
    }

    fn admit(&self, id: &TaskId) -> Admission {
        let Some(entry) = self.entries.get(id) else {
            return Admission::Cancel("task body missing".to_string());
        };
        if entry.cancel.is_cancelled() {
            return Admission::Cancel("cancelled before start".to_string());
        }

        let dependencies = self.dag.get_dependencies(id);
        for condition in &entry.conditions {
            if !condition.evaluate(&dependencies) {
                return Admission::Cancel(format!("precondition {} not met", condition.name()));
            }
        }
        Admission::Run
    }

    fn spawn(
        &mut self,
        id: &TaskId,
        running: &mut JoinSet<(TaskId, Result<()>)>,
        spawned: &mut HashMap<tokio::task::Id, TaskId>,
    ) {
        let (body, cancel) = match self.entries.get_mut(id) {
            Some(entry) => (entry.body.take(), entry.cancel.clone()),
            None => return,
        };
        let Some(body) = body else {
            self.settle_cancelled(id, "task body missing");
            return;
        };

        let Some(task) = self.dag.get_task_mut(id) else {
            return;
        };
        task.start();
        let name = task.name.clone();
        olog_debug!("OperationQueue: starting {} ({})", name, id.short());

        let ctx = TaskContext {
            id: *id,
            name: name.clone(),
            cancel,
        };
        let task_id = *id;
        let abort = running.spawn(async move { (task_id, body(ctx).await) });
        spawned.insert(abort.id(), task_id);

        self.emit(QueueEvent::TaskStarted {
            task_id,
            name,
        });
    }

    fn record(&mut self, id: &TaskId, result: Result<()>) {
        let Some(task) = self.dag.get_task_mut(id) else {
            return;
        };
        let task_id = task.id;
        let name = task.name.clone();

        let event = match result {
            Ok(()) => {
                task.finish();
                olog_debug!("OperationQueue: {} finished", name);
                QueueEvent::TaskFinished { task_id, name }
            }
            Err(Error::Cancelled) => {
                let reason = "cancelled while running".to_string();
                task.cancel(&reason);
                olog_debug!("OperationQueue: {} {}", name, reason);
                QueueEvent::TaskCancelled {
                    task_id,
                    name,
                    reason,
                }
            }
            Err(error) => {
                olog_debug!("OperationQueue: {} failed: {}", name, error);
                let message = error.to_string();
                task.fail(error);
                QueueEvent::TaskFailed {
                    task_id,
                    name,
                    error: message,
                }
            }
        };
        self.emit(event);
    }

    fn settle_cancelled(&mut self, id: &TaskId, reason: &str) {
        let Some(task) = self.dag.get_task_mut(id) else {
            return;
        };
        if task.is_terminal() {
            return;
        }
        task.cancel(reason);
        let name = task.name.clone();
        olog_debug!("OperationQueue: {} cancelled ({})", name, reason);

        if let Some(entry) = self.entries.get_mut(id) {
            entry.body = None;
        }
        self.emit(QueueEvent::TaskCancelled {
            task_id: *id,
            name,
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("dag", &self.dag)
            .field("cancelled", &self.root.is_cancelled())
            .field("started", &self.started)
            .finish()
    }
}
