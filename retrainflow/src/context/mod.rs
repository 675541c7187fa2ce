//! Run-scoped context for inter-task data passing.
//!
//! This module provides:
//! - A write-once store keyed by `(task_id, key)`
//! - Serializable snapshots of the store for run records
//! - The read-only, access-checked view handed to task actions

mod store;
mod view;

pub use store::{ContextSnapshot, ContextStore};
pub use view::TaskContext;
