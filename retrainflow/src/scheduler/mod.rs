//! Run scheduling.
//!
//! This module provides:
//! - [`RunScheduler`], which executes a task graph once and returns its record
//! - Per-task retry policies with backoff and optional jitter
//! - A cooperative [`CancellationToken`]

mod cancellation;
mod executor;
mod retry;


pub use cancellation::CancellationToken;
pub use executor::{RunScheduler, SchedulerConfig};
pub use retry::{Backoff, JitterStrategy, RetryPolicy};
