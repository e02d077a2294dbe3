//! Execution of task graphs.
//!
//! `OperationQueue` drives a `TaskDAG` to completion: it starts tasks as
//! their dependencies settle, gates them on preconditions and feeds bound
//! inputs from upstream outputs.

mod queue;

pub use queue::{OperationQueue, QueueEvent, TaskContext};
