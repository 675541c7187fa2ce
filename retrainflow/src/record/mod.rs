//! Per-run status tracking.
//!
//! A [`RunRecord`] holds one [`TaskRecord`] per task in topological order,
//! the run-level outcome and the final context snapshot. Records serialize
//! to stable JSON so they can be archived next to the run's artifacts.

use crate::context::ContextSnapshot;
use crate::core::{RunStatus, SkipReason, TaskStatus};
use crate::errors::RetrainflowError;
use crate::graph::TaskGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// The execution history of one task within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The task id.
    pub task_id: String,
    /// The current status.
    pub status: TaskStatus,
    /// Number of attempts started.
    pub attempts: u32,
    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// The last error; present iff the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the task was skipped; present iff the task was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl TaskRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            error: None,
            skip_reason: None,
        }
    }

    /// Marks the start of a new attempt.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.attempts += 1;
        self.started_at.get_or_insert(now);
    }

    /// Marks the task succeeded.
    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Succeeded;
        self.finished_at = Some(now);
    }

    /// Marks the task failed with its last error.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(now);
    }

    /// Marks the task skipped.
    pub fn mark_skipped(&mut self, reason: SkipReason, now: DateTime<Utc>) {
        self.status = TaskStatus::Skipped;
        self.skip_reason = Some(reason);
        self.finished_at = Some(now);
    }
}

/// The record of one run of a task graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The run id.
    pub run_id: Uuid,
    /// The graph name.
    pub graph: String,
    /// The overall outcome.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Why the run was cancelled or aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// One entry per task, in topological order.
    pub tasks: Vec<TaskRecord>,
    /// The context store at the end of the run.
    pub context: ContextSnapshot,
}

impl RunRecord {
    /// Creates a record with every task pending.
    #[must_use]
    pub fn new(run_id: Uuid, graph: &TaskGraph, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            graph: graph.name().to_string(),
            status: RunStatus::Succeeded,
            started_at,
            finished_at: None,
            reason: None,
            tasks: graph
                .topological_order()
                .into_iter()
                .map(TaskRecord::pending)
                .collect(),
            context: ContextSnapshot::default(),
        }
    }

    /// Returns the record of a task.
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Returns a mutable record of a task.
    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    /// Returns the status of a task.
    #[must_use]
    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.task(task_id).map(|t| t.status)
    }

    /// Returns the ids of tasks with the given status, in topological order.
    #[must_use]
    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.task_id.as_str())
            .collect()
    }

    /// Returns true once every task has a terminal status.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Derives the outcome of a run that was neither cancelled nor aborted.
    ///
    /// Any failed task makes the run `partially_failed`; skips do not.
    #[must_use]
    pub fn completed_status(&self) -> RunStatus {
        if self.tasks.iter().any(|t| t.status == TaskStatus::Failed) {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Succeeded
        }
    }

    /// Serializes the record as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the record as JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), RetrainflowError> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a record previously written with [`write_json`](Self::write_json).
    pub fn read_json(path: &Path) -> Result<Self, RetrainflowError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
