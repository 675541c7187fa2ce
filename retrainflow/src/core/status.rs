//! Task, skip and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been decided yet.
    #[default]
    Pending,
    /// Task is currently executing an attempt.
    Running,
    /// Task completed successfully.
    Succeeded,
    /// Task exhausted its attempts.
    Failed,
    /// Task was never attempted.
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns true if downstream tasks with the default trigger rule must be
    /// skipped because of this status.
    #[must_use]
    pub fn blocks_downstream(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

/// Why a task was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency failed or was skipped.
    UpstreamFailed,
    /// The task's gate evaluated false.
    GateRejected,
    /// The run was cancelled before the task started.
    RunCancelled,
    /// The run was aborted by a context violation before the task started.
    RunAborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamFailed => write!(f, "upstream_failed"),
            Self::GateRejected => write!(f, "gate_rejected"),
            Self::RunCancelled => write!(f, "run_cancelled"),
            Self::RunAborted => write!(f, "run_aborted"),
        }
    }
}

/// The overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No task failed. Gate rejections do not count as failures.
    Succeeded,
    /// At least one task failed; the rest of the graph still ran.
    PartiallyFailed,
    /// The run was cancelled.
    Cancelled,
    /// The run was aborted by a context violation.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartiallyFailed => write!(f, "partially_failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
