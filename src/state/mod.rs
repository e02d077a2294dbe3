//! Shared device and tunnel state.

mod store;

pub use store::{AppState, StateStore};
