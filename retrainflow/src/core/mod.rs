//! Core domain model types for retrainflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Task, skip and run status enums
//! - The output mapping a task action produces

mod output;
mod status;

pub use output::TaskOutput;
pub use status::{RunStatus, SkipReason, TaskStatus};
