//! Building blocks of the task graph: task records, the dependency DAG,
//! typed handles, preconditions and data-flow bindings.

pub mod binding;
pub mod condition;
pub mod dag;
pub mod handle;
pub mod task;

pub use binding::{Bindings, PartialInput, Required};
pub use condition::{BlockCondition, Condition, NoFailedDependencies};
pub use dag::TaskDAG;
pub use handle::TaskHandle;
pub use task::{Task, TaskId, TaskStatus};
