pub mod config;
pub mod error;
pub mod log;
pub mod retry;

// Task graph and its executor
pub mod core;
pub mod orchestration;

// VPN client domain
pub mod lifecycle;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use lifecycle::{AccountLifecycle, LifecycleResult, SetAccountAction};
pub use orchestration::{OperationQueue, QueueEvent, TaskContext};
pub use state::{AppState, StateStore};
pub use transport::{Transport, TransportProvider};
