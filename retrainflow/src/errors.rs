//! Error types for retrainflow.
//!
//! Graph errors are raised at build time and are fatal before any task runs.
//! Context errors indicate an authoring bug and abort a run. Task execution
//! errors are retried by the scheduler and degrade to a `failed` status.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::record::RunRecord;

/// The main error type for retrainflow operations.
#[derive(Debug, Error)]
pub enum RetrainflowError {
    /// The task graph failed validation.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// The run-scoped context was misused.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// A run was aborted by a context contract violation.
    #[error("{0}")]
    Aborted(#[from] Box<RunAborted>),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RunAborted> for RetrainflowError {
    fn from(err: RunAborted) -> Self {
        Self::Aborted(Box::new(err))
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Errors raised while building a task graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The dependency edges form a cycle.
    #[error("Cycle detected in task graph: {}", path.join(" -> "))]
    Cycle {
        /// The tasks forming the cycle; the first task is repeated at the end.
        path: Vec<String>,
    },

    /// A dependency or edge references a task that is not in the graph.
    #[error("Task '{task}' references unknown task '{dependency}'")]
    UnknownDependency {
        /// The task declaring the reference.
        task: String,
        /// The missing task id.
        dependency: String,
    },

    /// An extra edge names a task that is not in the graph.
    #[error("Edge '{upstream}' -> '{downstream}' references unknown task '{missing}'")]
    UnknownEdgeTask {
        /// The edge's upstream end.
        upstream: String,
        /// The edge's downstream end.
        downstream: String,
        /// Whichever end is missing.
        missing: String,
    },

    /// Two tasks share an id.
    #[error("Duplicate task id '{task}'")]
    DuplicateTask {
        /// The repeated id.
        task: String,
    },

    /// The graph has no tasks.
    #[error("Task graph '{name}' has no tasks")]
    Empty {
        /// The graph name.
        name: String,
    },

    /// A flag gate reads from a task that is not upstream of the gated task.
    #[error("Gate on task '{task}' reads from '{gate_task}', which is not upstream of it")]
    InvalidGate {
        /// The gated task.
        task: String,
        /// The namespace the gate reads from.
        gate_task: String,
    },

    /// A retry policy cannot be executed.
    #[error("Task '{task}' has an invalid retry policy: {reason}")]
    InvalidRetryPolicy {
        /// The task owning the policy.
        task: String,
        /// Why the policy was rejected.
        reason: String,
    },
}

impl GraphError {
    /// Returns the task ids involved in the error.
    #[must_use]
    pub fn tasks(&self) -> Vec<&str> {
        match self {
            Self::Cycle { path } => path.iter().map(String::as_str).collect(),
            Self::UnknownDependency { task, dependency } => vec![task.as_str(), dependency.as_str()],
            Self::UnknownEdgeTask {
                upstream,
                downstream,
                ..
            } => vec![upstream.as_str(), downstream.as_str()],
            Self::DuplicateTask { task } | Self::InvalidRetryPolicy { task, .. } => vec![task.as_str()],
            Self::Empty { .. } => Vec::new(),
            Self::InvalidGate { task, gate_task } => vec![task.as_str(), gate_task.as_str()],
        }
    }

    /// Returns a diagnostic code and fix hint for the error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::Cycle { .. } => ContractErrorInfo::new("GRAPH-CYCLE", self.to_string())
                .with_fix_hint("Remove one of the dependencies in the cycle to break it."),
            Self::UnknownDependency { dependency, .. } => ContractErrorInfo::new(
                "GRAPH-UNKNOWN_DEP",
                format!("Dependency '{dependency}' not found"),
            )
            .with_fix_hint("Declare the dependency as a task in the same graph."),
            Self::UnknownEdgeTask { missing, .. } => ContractErrorInfo::new(
                "GRAPH-UNKNOWN_DEP",
                format!("Edge endpoint '{missing}' not found"),
            )
            .with_fix_hint("Declare both ends of the edge as tasks in the same graph."),
            Self::DuplicateTask { .. } => ContractErrorInfo::new("GRAPH-DUPLICATE", self.to_string())
                .with_fix_hint("Task ids must be unique within a graph."),
            Self::Empty { .. } => ContractErrorInfo::new("GRAPH-EMPTY", "Cannot build an empty graph")
                .with_fix_hint("Add at least one task before building."),
            Self::InvalidGate { .. } => ContractErrorInfo::new("GRAPH-GATE", self.to_string())
                .with_fix_hint("Make the gated task depend on the task its gate reads from."),
            Self::InvalidRetryPolicy { .. } => {
                ContractErrorInfo::new("GRAPH-RETRY", self.to_string())
                    .with_fix_hint("max_attempts must be at least 1.")
            }
        }
    }
}

/// Errors raised by the run-scoped context store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A `(task_id, key)` pair was written twice in one run.
    #[error("Duplicate key: '{task_id}.{key}' was already written in this run")]
    DuplicateKey {
        /// The namespace written to.
        task_id: String,
        /// The repeated key.
        key: String,
    },

    /// A required key is absent.
    #[error("Key not found: '{task_id}.{key}'")]
    NotFound {
        /// The namespace read from.
        task_id: String,
        /// The missing key.
        key: String,
    },

    /// A task read from a namespace that is not upstream of it.
    #[error("Access violation: task '{reader}' read '{task_id}.{key}' but '{task_id}' is not upstream of it")]
    AccessViolation {
        /// The task performing the read.
        reader: String,
        /// The namespace read from.
        task_id: String,
        /// The key read.
        key: String,
    },
}

impl ContextError {
    /// Creates a duplicate key error.
    #[must_use]
    pub fn duplicate_key(task_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            task_id: task_id.into(),
            key: key.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(task_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            task_id: task_id.into(),
            key: key.into(),
        }
    }

    /// Creates an access violation error.
    #[must_use]
    pub fn access_violation(
        reader: impl Into<String>,
        task_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::AccessViolation {
            reader: reader.into(),
            task_id: task_id.into(),
            key: key.into(),
        }
    }
}

/// A failed attempt of a task action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskExecutionError {
    /// The action returned an error.
    #[error("Task '{task}' failed on attempt {attempt}: {message}")]
    Failed {
        /// The task id.
        task: String,
        /// The 1-indexed attempt number.
        attempt: u32,
        /// The rendered action error, including its causes.
        message: String,
    },

    /// The attempt exceeded the task's timeout.
    #[error("Task '{task}' timed out after {timeout_ms}ms on attempt {attempt}")]
    TimedOut {
        /// The task id.
        task: String,
        /// The 1-indexed attempt number.
        attempt: u32,
        /// The configured per-attempt timeout.
        timeout_ms: u64,
    },
}

impl TaskExecutionError {
    /// Wraps an action error.
    #[must_use]
    pub fn failed(task: impl Into<String>, attempt: u32, error: &anyhow::Error) -> Self {
        Self::Failed {
            task: task.into(),
            attempt,
            message: format!("{error:#}"),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timed_out(task: impl Into<String>, attempt: u32, timeout: std::time::Duration) -> Self {
        Self::TimedOut {
            task: task.into(),
            attempt,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the attempt that produced this error.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        match self {
            Self::Failed { attempt, .. } | Self::TimedOut { attempt, .. } => *attempt,
        }
    }
}

/// A run stopped early because a task misused the context store.
///
/// Carries the partial run record: the offending task is `failed` and every
/// task that had not started is `skipped` with reason `run_aborted`.
#[derive(Debug, Error)]
#[error("Run {run_id} aborted by task '{task}': {cause}")]
pub struct RunAborted {
    /// The aborted run.
    pub run_id: Uuid,
    /// The task that triggered the abort.
    pub task: String,
    /// The context violation.
    #[source]
    pub cause: ContextError,
    /// The record as of the abort.
    pub record: Box<RunRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_display() {
        let err = GraphError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cycle detected in task graph: a -> b -> a");
        assert_eq!(err.tasks(), vec!["a", "b", "a"]);
        assert_eq!(err.error_info().code, "GRAPH-CYCLE");
    }

    #[test]
    fn test_unknown_dependency_info() {
        let err = GraphError::UnknownDependency {
            task: "train".into(),
            dependency: "missing".into(),
        };
        let info = err.error_info();
        assert_eq!(info.code, "GRAPH-UNKNOWN_DEP");
        assert!(info.fix_hint.is_some());
    }

    #[test]
    fn test_context_error_display() {
        let err = ContextError::access_violation("deploy", "notify", "report");
        assert!(err.to_string().contains("'notify' is not upstream"));

        let err = ContextError::duplicate_key("train", "run_id");
        assert_eq!(
            err.to_string(),
            "Duplicate key: 'train.run_id' was already written in this run"
        );
    }

    #[test]
    fn test_task_execution_error_keeps_causes() {
        let cause = anyhow::anyhow!("disk full").context("writing model");
        let err = TaskExecutionError::failed("train", 2, &cause);
        assert_eq!(err.attempt(), 2);
        assert!(err.to_string().contains("writing model: disk full"));
    }

    #[test]
    fn test_timed_out_error() {
        let err = TaskExecutionError::timed_out("train", 1, std::time::Duration::from_millis(250));
        assert_eq!(err.to_string(), "Task 'train' timed out after 250ms on attempt 1");
    }
}
