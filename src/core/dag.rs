//! Task dependency graph.
//!
//! `TaskDAG` holds the scheduling structure of an operation queue: task
//! records as nodes and "must be terminal before" relations as edges. It is
//! kept acyclic at all times; `add_dependency` refuses an edge that would
//! close a cycle.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

pub struct TaskDAG {
    graph: DiGraph<Task, ()>,
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task. Adding a task whose id is already present is a no-op.
    pub fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&task.id) {
            return index;
        }

        let id = task.id;
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        index
    }

    /// Declare that `to` may not start before `from` is terminal.
    ///
    /// # Errors
    /// - either task is unknown
    /// - the edge would create a cycle (including a self-loop)
    pub fn add_dependency(&mut self, from: &TaskId, to: &TaskId) -> Result<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;

        if has_path_connecting(&self.graph, to_index, from_index, None) {
            return Err(Error::Validation(format!(
                "Adding dependency from {} to {} would create a cycle",
                self.graph[from_index].name, self.graph[to_index].name
            )));
        }

        self.graph.update_edge(from_index, to_index, ());
        Ok(())
    }

    fn index_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.task_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::Validation(format!("Task {} not found in DAG", id)))
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let index = *self.task_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        match (self.task_index.get(from), self.task_index.get(to)) {
            (Some(&from_idx), Some(&to_idx)) => self.graph.find_edge(from_idx, to_idx).is_some(),
            _ => false,
        }
    }

    /// Direct predecessors of a task, in schedule order.
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct successors of a task, in schedule order.
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&Task> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut tasks: Vec<&Task> = self
            .graph
            .neighbors_directed(index, direction)
            .filter_map(|neighbor| self.graph.node_weight(neighbor))
            .collect();
        tasks.sort_by_key(|task| task.sequence);
        tasks
    }

    /// Every task, in schedule order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.graph.node_weights().collect();
        tasks.sort_by_key(|task| task.sequence);
        tasks
    }

    // ========== Scheduling Operations ==========

    /// Pending tasks whose dependencies are all terminal, in schedule order.
    ///
    /// Success of a dependency is not required here; gating on outcomes is
    /// the job of preconditions.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .graph
            .node_indices()
            .filter_map(|index| {
                let task = self.graph.node_weight(index)?;
                if !task.is_pending() {
                    return None;
                }
                let deps_terminal = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .all(|dep| self.graph[dep].is_terminal());
                deps_terminal.then_some(task)
            })
            .collect();
        ready.sort_by_key(|task| task.sequence);
        ready.into_iter().map(|task| task.id).collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.graph.node_weights().all(Task::is_terminal)
    }

    pub fn pending_count(&self) -> usize {
        self.graph.node_weights().filter(|t| t.is_pending()).count()
    }

    /// Tasks ordered so every task comes after its dependencies.
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let task_name = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.name.as_str())
                .unwrap_or("unknown");
            Error::Validation(format!("Cycle detected at task: {}", task_name))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
