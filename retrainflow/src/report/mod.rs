//! Human-readable run summaries.
//!
//! A [`PipelineSummary`] is gathered either from a finished [`RunRecord`] or
//! from the context view of a reporting task, and rendered as plain text.
//! Gathering never fails: anything missing renders as [`PLACEHOLDER`].
//! Rendering is pure, so the same summary always yields the same bytes.

use crate::context::TaskContext;
use crate::core::TaskStatus;
use crate::record::RunRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Write as _};
use uuid::Uuid;

/// Rendered in place of any missing value.
pub const PLACEHOLDER: &str = "N/A";

const HEADER: &str = "=== ML Pipeline Report ===";
const FOOTER: &str = "==========================";

/// Which tasks hold the values a summary reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLayout {
    /// Task writing `train_samples`.
    pub extract_task: String,
    /// Task writing `run_id` and `train_accuracy`.
    pub train_task: String,
    /// Task writing `accuracy`.
    pub evaluate_task: String,
    /// Task writing `status` on deployment.
    pub deploy_task: String,
}

impl ReportLayout {
    /// Creates a layout from the ids of the reporting tasks.
    #[must_use]
    pub fn new(
        extract_task: impl Into<String>,
        train_task: impl Into<String>,
        evaluate_task: impl Into<String>,
        deploy_task: impl Into<String>,
    ) -> Self {
        Self {
            extract_task: extract_task.into(),
            train_task: train_task.into(),
            evaluate_task: evaluate_task.into(),
            deploy_task: deploy_task.into(),
        }
    }
}

/// The status line of one task in a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLine {
    /// The task id.
    pub task_id: String,
    /// The task status.
    pub status: TaskStatus,
    /// Skip reason or attempt count, when known.
    pub detail: Option<String>,
}

/// Values shown in a run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// The run id.
    pub run_id: Uuid,
    /// When the run started.
    pub time: DateTime<Utc>,
    /// Number of training samples.
    pub train_samples: Option<u64>,
    /// Identifier of the model training run.
    pub model_run_id: Option<String>,
    /// Accuracy on the training split.
    pub train_accuracy: Option<f64>,
    /// Accuracy on the test split.
    pub test_accuracy: Option<f64>,
    /// Deployment outcome.
    pub deploy_status: Option<String>,
    /// Per-task statuses in topological order.
    pub tasks: Vec<TaskLine>,
}

impl PipelineSummary {
    /// Gathers a summary from a finished run.
    #[must_use]
    pub fn from_record(record: &RunRecord, layout: &ReportLayout) -> Self {
        let value = |task: &str, key: &str| record.context.get(task, key).cloned();
        let deploy_status = value(&layout.deploy_task, "status")
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| status_label(record.status_of(&layout.deploy_task)));

        let tasks = record
            .tasks
            .iter()
            .map(|task| TaskLine {
                task_id: task.task_id.clone(),
                status: task.status,
                detail: match (task.skip_reason, task.status) {
                    (Some(reason), _) => Some(reason.to_string()),
                    (None, TaskStatus::Succeeded | TaskStatus::Failed) if task.attempts > 1 => {
                        Some(format!("{} attempts", task.attempts))
                    }
                    _ => None,
                },
            })
            .collect();

        Self {
            run_id: record.run_id,
            time: record.started_at,
            train_samples: value(&layout.extract_task, "train_samples").and_then(|v| v.as_u64()),
            model_run_id: value(&layout.train_task, "run_id").map(text),
            train_accuracy: value(&layout.train_task, "train_accuracy").and_then(|v| v.as_f64()),
            test_accuracy: value(&layout.evaluate_task, "accuracy").and_then(|v| v.as_f64()),
            deploy_status,
            tasks,
        }
    }

    /// Gathers a summary from inside a running task.
    ///
    /// Only namespaces the task may read are consulted, so gathering never
    /// trips the context access rules.
    #[must_use]
    pub fn from_context(ctx: &TaskContext<'_>, layout: &ReportLayout) -> Self {
        let value = |task: &str, key: &str| -> Option<Value> {
            if ctx.can_read(task) {
                ctx.read_optional(task, key).ok().flatten()
            } else {
                None
            }
        };
        let deploy_status = value(&layout.deploy_task, "status")
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| status_label(ctx.upstream_status(&layout.deploy_task)));

        let tasks = ctx
            .graph()
            .topological_order()
            .into_iter()
            .filter_map(|id| {
                ctx.upstream_status(id).map(|status| TaskLine {
                    task_id: id.to_string(),
                    status,
                    detail: None,
                })
            })
            .collect();

        Self {
            run_id: ctx.run_id(),
            time: ctx.run_started_at(),
            train_samples: value(&layout.extract_task, "train_samples").and_then(|v| v.as_u64()),
            model_run_id: value(&layout.train_task, "run_id").map(text),
            train_accuracy: value(&layout.train_task, "train_accuracy").and_then(|v| v.as_f64()),
            test_accuracy: value(&layout.evaluate_task, "accuracy").and_then(|v| v.as_f64()),
            deploy_status,
            tasks,
        }
    }

    /// Renders the report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_report(&mut out);
        out
    }

    fn write_report(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "{HEADER}")?;
        writeln!(out, "Run: {}", self.run_id)?;
        writeln!(out, "Time: {}", self.time.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "Training Samples: {}", or_placeholder(self.train_samples))?;
        writeln!(out, "Model Run: {}", or_placeholder(self.model_run_id.as_deref()))?;
        writeln!(out, "Train Accuracy: {}", accuracy(self.train_accuracy))?;
        writeln!(out, "Test Accuracy: {}", accuracy(self.test_accuracy))?;
        writeln!(out, "Deploy Status: {}", or_placeholder(self.deploy_status.as_deref()))?;
        if !self.tasks.is_empty() {
            writeln!(out, "Tasks:")?;
            for line in &self.tasks {
                match &line.detail {
                    Some(detail) => writeln!(out, "  {}: {} ({detail})", line.task_id, line.status)?,
                    None => writeln!(out, "  {}: {}", line.task_id, line.status)?,
                }
            }
        }
        writeln!(out, "{FOOTER}")
    }
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn status_label(status: Option<TaskStatus>) -> Option<String> {
    match status? {
        TaskStatus::Pending | TaskStatus::Running => None,
        status => Some(status.to_string()),
    }
}

fn or_placeholder<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| v.to_string())
}

fn accuracy(value: Option<f64>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{v:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStore;
    use crate::core::SkipReason;
    use crate::graph::{GraphBuilder, NoOpAction, Task, TaskGraph};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const EXTRACT_TASK: &str = "extract_data";
    const TRAIN_TASK: &str = "train_model";
    const EVALUATE_TASK: &str = "evaluate";
    const DEPLOY_TASK: &str = "deploy";

    fn layout() -> ReportLayout {
        ReportLayout::new(EXTRACT_TASK, TRAIN_TASK, EVALUATE_TASK, DEPLOY_TASK)
    }

    fn retrain_graph() -> TaskGraph {
        GraphBuilder::new("retrain")
            .task(Task::new(EXTRACT_TASK, Arc::new(NoOpAction)))
            .task(Task::new(TRAIN_TASK, Arc::new(NoOpAction)))
            .task(Task::new(EVALUATE_TASK, Arc::new(NoOpAction)))
            .task(Task::new(DEPLOY_TASK, Arc::new(NoOpAction)))
            .task(Task::new("notify", Arc::new(NoOpAction)))
            .chain(&[EXTRACT_TASK, TRAIN_TASK, EVALUATE_TASK, DEPLOY_TASK, "notify"])
            .build()
            .unwrap()
    }

    fn started_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 30, 0).unwrap()
    }

    fn record_with(store: &ContextStore) -> RunRecord {
        let mut record = RunRecord::new(Uuid::nil(), &retrain_graph(), started_at());
        record.context = store.snapshot();
        record
    }

    #[test]
    fn test_render_full_report() {
        let store = ContextStore::new();
        store.write(EXTRACT_TASK, "train_samples", 120).unwrap();
        store.write(TRAIN_TASK, "run_id", "abc123").unwrap();
        store.write(TRAIN_TASK, "train_accuracy", 0.991_666).unwrap();
        store.write(EVALUATE_TASK, "accuracy", 0.966_666).unwrap();
        store.write(DEPLOY_TASK, "status", "deployed").unwrap();

        let mut record = record_with(&store);
        let now = started_at();
        for id in [EXTRACT_TASK, EVALUATE_TASK, DEPLOY_TASK, "notify"] {
            record.task_mut(id).unwrap().mark_succeeded(now);
        }
        let train = record.task_mut(TRAIN_TASK).unwrap();
        train.start_attempt(now);
        train.start_attempt(now);
        train.mark_succeeded(now);

        let report = PipelineSummary::from_record(&record, &layout()).render();
        let expected = "\
=== ML Pipeline Report ===
Run: 00000000-0000-0000-0000-000000000000
Time: 2024-01-01 06:30:00
Training Samples: 120
Model Run: abc123
Train Accuracy: 0.9917
Test Accuracy: 0.9667
Deploy Status: deployed
Tasks:
  extract_data: succeeded
  train_model: succeeded (2 attempts)
  evaluate: succeeded
  deploy: succeeded
  notify: succeeded
==========================
";
        assert_eq!(report, expected);
    }

    #[test]
    fn test_missing_values_render_placeholder() {
        let store = ContextStore::new();
        store.write(EXTRACT_TASK, "train_samples", 120).unwrap();

        let mut record = record_with(&store);
        let now = started_at();
        record.task_mut(EXTRACT_TASK).unwrap().mark_succeeded(now);
        record.task_mut(TRAIN_TASK).unwrap().mark_failed("boom", now);
        for id in [EVALUATE_TASK, DEPLOY_TASK] {
            record
                .task_mut(id)
                .unwrap()
                .mark_skipped(SkipReason::UpstreamFailed, now);
        }

        let report = PipelineSummary::from_record(&record, &layout()).render();
        assert!(report.contains("Training Samples: 120\n"));
        assert!(report.contains("Model Run: N/A\n"));
        assert!(report.contains("Train Accuracy: N/A\n"));
        assert!(report.contains("Test Accuracy: N/A\n"));
        assert!(report.contains("Deploy Status: skipped\n"));
        assert!(report.contains("  deploy: skipped (upstream_failed)\n"));
        assert!(report.contains("  notify: pending\n"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let store = ContextStore::new();
        store.write(TRAIN_TASK, "train_accuracy", 0.5).unwrap();
        let record = record_with(&store);

        let first = PipelineSummary::from_record(&record, &layout()).render();
        let second = PipelineSummary::from_record(&record, &layout()).render();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_from_context_uses_upstream_view() {
        let graph = retrain_graph();
        let store = ContextStore::new();
        store.write(EXTRACT_TASK, "train_samples", 120).unwrap();
        store.write(TRAIN_TASK, "run_id", json!("r-9")).unwrap();

        let upstream = BTreeMap::from([
            (EXTRACT_TASK.to_string(), TaskStatus::Succeeded),
            (TRAIN_TASK.to_string(), TaskStatus::Succeeded),
            (EVALUATE_TASK.to_string(), TaskStatus::Succeeded),
            (DEPLOY_TASK.to_string(), TaskStatus::Skipped),
        ]);
        let ctx = TaskContext::new("notify", Uuid::nil(), started_at(), 1, &store, &graph, upstream);

        let summary = PipelineSummary::from_context(&ctx, &layout());
        assert_eq!(summary.train_samples, Some(120));
        assert_eq!(summary.model_run_id.as_deref(), Some("r-9"));
        assert_eq!(summary.test_accuracy, None);
        assert_eq!(summary.deploy_status.as_deref(), Some("skipped"));
        assert_eq!(summary.tasks.len(), 4);
        assert!(ctx.take_violation().is_none());
    }

    #[test]
    fn test_from_context_skips_unreadable_namespaces() {
        let graph = retrain_graph();
        let store = ContextStore::new();
        store.write(DEPLOY_TASK, "status", "deployed").unwrap();

        let ctx = TaskContext::new(TRAIN_TASK, Uuid::nil(), started_at(), 1, &store, &graph, BTreeMap::new());
        let summary = PipelineSummary::from_context(&ctx, &layout());

        assert_eq!(summary.deploy_status, None);
        assert!(ctx.take_violation().is_none());
    }
}
