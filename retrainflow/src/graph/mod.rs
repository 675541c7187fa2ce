//! Task graph definition and validation.
//!
//! This module provides:
//! - Task definitions with actions, gates, retry policies and trigger rules
//! - A validated, acyclic task graph with deterministic topological order
//! - A fluent builder for assembling graphs

mod builder;
mod dag;
mod task;

pub use builder::GraphBuilder;
pub use dag::{Edge, TaskGraph};
pub use task::{ActionResult, FnAction, Gate, GatePredicate, NoOpAction, Task, TaskAction, TriggerRule};
