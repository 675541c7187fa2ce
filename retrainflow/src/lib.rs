//! # Retrainflow
//!
//! A task-graph engine for retraining, evaluating and conditionally
//! deploying a classification model on a fixed cadence.
//!
//! Retrainflow provides:
//!
//! - **Task graphs**: named tasks with declared dependencies, validated for
//!   cycles and unknown references, with a deterministic topological order
//! - **Run-scoped context**: a write-once `(task, key)` store whose reads are
//!   restricted to upstream tasks
//! - **Scheduling**: per-task retry policies, per-attempt timeouts, gates,
//!   skip propagation and cooperative cancellation
//! - **Run records and reports**: per-task status tracking and a
//!   human-readable summary that always renders
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use retrainflow::prelude::*;
//!
//! let graph = GraphBuilder::new("retrain")
//!     .task(Task::new("extract", extract))
//!     .task(Task::new("train", train).with_dependency("extract"))
//!     .task(Task::new("deploy", deploy).with_dependency("train").gated_on("train", "ok"))
//!     .build()?;
//!
//! let record = RunScheduler::new().execute(&graph, ContextStore::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod app;
pub mod cli;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod logging;
pub mod record;
pub mod report;
pub mod retrain;
pub mod scheduler;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{ContextSnapshot, ContextStore, TaskContext};
    pub use crate::core::{RunStatus, SkipReason, TaskOutput, TaskStatus};
    pub use crate::errors::{
        ContextError, ContractErrorInfo, GraphError, RetrainflowError, RunAborted,
        TaskExecutionError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{
        Edge, FnAction, Gate, GraphBuilder, NoOpAction, Task, TaskAction, TaskGraph, TriggerRule,
    };
    pub use crate::record::{RunRecord, TaskRecord};
    pub use crate::report::{PipelineSummary, ReportLayout};
    pub use crate::retrain::{Collaborators, RetrainConfig, RetrainPipeline};
    pub use crate::scheduler::{
        Backoff, CancellationToken, JitterStrategy, RetryPolicy, RunScheduler, SchedulerConfig,
    };
}
