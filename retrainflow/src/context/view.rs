//! Read-only, access-checked view of the context handed to task actions.

use super::ContextStore;
use crate::core::TaskStatus;
use crate::errors::ContextError;
use crate::graph::TaskGraph;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The context a task sees while it runs.
///
/// A task may read from the namespace of any task that is upstream of it
/// (directly or transitively) and from any namespace that is not a task id
/// (run-level inputs seeded into the initial context). Any other read fails
/// with `AccessViolation`.
///
/// Strict reads of absent keys, access violations and duplicate writes are
/// contract violations: the first one is recorded here and the scheduler
/// aborts the run once the current attempt returns, even if the action
/// swallowed the error.
#[derive(Debug)]
pub struct TaskContext<'a> {
    task_id: &'a str,
    run_id: Uuid,
    run_started_at: DateTime<Utc>,
    attempt: u32,
    store: &'a ContextStore,
    graph: &'a TaskGraph,
    upstream: BTreeMap<String, TaskStatus>,
    violation: Mutex<Option<ContextError>>,
}

impl<'a> TaskContext<'a> {
    /// Creates a view for one attempt of a task.
    #[must_use]
    pub fn new(
        task_id: &'a str,
        run_id: Uuid,
        run_started_at: DateTime<Utc>,
        attempt: u32,
        store: &'a ContextStore,
        graph: &'a TaskGraph,
        upstream: BTreeMap<String, TaskStatus>,
    ) -> Self {
        Self {
            task_id,
            run_id,
            run_started_at,
            attempt,
            store,
            graph,
            upstream,
            violation: Mutex::new(None),
        }
    }

    /// Returns the id of the task this view belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        self.task_id
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the run started.
    #[must_use]
    pub fn run_started_at(&self) -> DateTime<Utc> {
        self.run_started_at
    }

    /// Returns the 1-indexed attempt number, or 0 while evaluating a gate.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the graph being executed.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        self.graph
    }

    /// Returns whether this task may read from `task_id`.
    #[must_use]
    pub fn can_read(&self, task_id: &str) -> bool {
        !self.graph.contains(task_id) || self.graph.is_ancestor(task_id, self.task_id)
    }

    /// Reads a required value.
    ///
    /// # Errors
    ///
    /// Returns `AccessViolation` if `task_id` is not upstream, or `NotFound`
    /// if the key is absent. Both abort the run.
    pub fn read(&self, task_id: &str, key: &str) -> Result<serde_json::Value, ContextError> {
        self.check_access(task_id, key)?;
        self.store.read(task_id, key).map_err(|err| self.record(err))
    }

    /// Reads a value that may legitimately be absent, e.g. the output of an
    /// upstream task that was skipped.
    ///
    /// # Errors
    ///
    /// Returns `AccessViolation` if `task_id` is not upstream.
    pub fn read_optional(
        &self,
        task_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, ContextError> {
        self.check_access(task_id, key)?;
        Ok(self.store.get(task_id, key))
    }

    /// Returns the terminal status of an upstream task.
    #[must_use]
    pub fn upstream_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.upstream.get(task_id).copied()
    }

    /// Returns the statuses of every upstream task.
    #[must_use]
    pub fn upstream_statuses(&self) -> &BTreeMap<String, TaskStatus> {
        &self.upstream
    }

    /// Takes the first recorded contract violation.
    pub(crate) fn take_violation(&self) -> Option<ContextError> {
        self.violation.lock().take()
    }

    fn check_access(&self, task_id: &str, key: &str) -> Result<(), ContextError> {
        if self.can_read(task_id) {
            Ok(())
        } else {
            Err(self.record(ContextError::access_violation(self.task_id, task_id, key)))
        }
    }

    fn record(&self, err: ContextError) -> ContextError {
        let mut slot = self.violation.lock();
        if slot.is_none() {
            *slot = Some(err.clone());
        }
        err
    }
}
