//! Run lifecycle events.
//!
//! The scheduler reports every run and task transition to an [`EventSink`].
//! Event types are dotted names; the payload is a JSON object that always
//! carries `run_id` and, for task events, `task`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started executing.
pub const RUN_STARTED: &str = "run.started";
/// Every task reached a terminal status.
pub const RUN_COMPLETED: &str = "run.completed";
/// The run stopped early because its cancellation token fired.
pub const RUN_CANCELLED: &str = "run.cancelled";
/// The run stopped early on a context contract violation.
pub const RUN_ABORTED: &str = "run.aborted";

/// A task attempt started.
pub const TASK_STARTED: &str = "task.started";
/// A task attempt failed and another attempt is scheduled.
pub const TASK_RETRYING: &str = "task.retrying";
/// A task succeeded and its outputs were merged.
pub const TASK_SUCCEEDED: &str = "task.succeeded";
/// A task exhausted its attempts.
pub const TASK_FAILED: &str = "task.failed";
/// A task was skipped without running.
pub const TASK_SKIPPED: &str = "task.skipped";
