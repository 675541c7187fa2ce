//! Run scheduler.
//!
//! Walks a validated [`TaskGraph`] in topological order, deciding for every
//! task whether it is skipped, gated out or attempted, applying its retry
//! policy and merging its outputs into the run's context store.

use super::CancellationToken;
use crate::context::{ContextStore, TaskContext};
use crate::core::{RunStatus, SkipReason, TaskOutput, TaskStatus};
use crate::errors::{ContextError, RunAborted, TaskExecutionError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::graph::{Task, TaskGraph, TriggerRule};
use crate::record::RunRecord;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Scheduler options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of tasks running at once. `1` runs strictly
    /// sequentially in topological order.
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

/// Identity of the run a task attempt belongs to.
#[derive(Debug, Clone, Copy)]
struct RunInfo {
    id: Uuid,
    started_at: DateTime<Utc>,
}

/// How a dispatched task ended.
#[derive(Debug)]
enum TaskResult {
    Succeeded(TaskOutput),
    Failed(TaskExecutionError),
    Violation(ContextError),
}

#[derive(Debug)]
struct TaskOutcome {
    task_id: String,
    attempts: u32,
    result: TaskResult,
}

/// Executes task graphs.
///
/// The scheduler owns the run record and the context store for the lifetime
/// of a run; task actions only ever see a borrowed [`TaskContext`].
pub struct RunScheduler {
    config: SchedulerConfig,
    events: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
}

impl Default for RunScheduler {
    fn default() -> Self {
        Self {
            config: SchedulerConfig::default(),
            events: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }
}

impl std::fmt::Debug for RunScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunScheduler")
            .field("config", &self.config)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl RunScheduler {
    /// Creates a sequential scheduler with no event sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scheduler options.
    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of concurrently running tasks.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the scheduler options.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the cancellation token observed by this scheduler.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation)
    }

    /// Executes the graph once.
    ///
    /// `initial_context` seeds the run's store. Values under a namespace that
    /// is not a task id are readable by every task.
    ///
    /// Task failures never make this return an error: they are recorded and
    /// the rest of the graph keeps running. The run record is returned once
    /// every task is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] with the partial record when a task misuses the
    /// context store (duplicate write, strict read of an absent key, or a
    /// read from a task that is not upstream of it).
    pub async fn execute(
        &self,
        graph: &TaskGraph,
        initial_context: ContextStore,
    ) -> Result<RunRecord, RunAborted> {
        let run = RunInfo {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        let span = info_span!("run", run_id = %run.id, graph = graph.name());
        self.execute_run(graph, initial_context, run)
            .instrument(span)
            .await
    }

    async fn execute_run(
        &self,
        graph: &TaskGraph,
        store: ContextStore,
        run: RunInfo,
    ) -> Result<RunRecord, RunAborted> {
        let mut record = RunRecord::new(run.id, graph, run.started_at);
        let halt = CancellationToken::new();
        let max_concurrency = self.config.max_concurrency.max(1);
        let mut abort: Option<(String, ContextError)> = None;

        info!(tasks = graph.len(), max_concurrency, "Run started");
        self.emit(
            events::RUN_STARTED,
            json!({
                "run_id": run.id,
                "graph": graph.name(),
                "tasks": graph.topological_order(),
            }),
        )
        .await;

        let mut in_flight: FuturesUnordered<BoxFuture<'_, TaskOutcome>> = FuturesUnordered::new();

        loop {
            if abort.is_none() {
                for task in graph.tasks_in_order() {
                    if record.status_of(&task.id) != Some(TaskStatus::Pending) {
                        continue;
                    }
                    let deps: Vec<TaskStatus> = task
                        .dependencies
                        .iter()
                        .filter_map(|dep| record.status_of(dep))
                        .collect();
                    if !deps.iter().all(TaskStatus::is_terminal) {
                        continue;
                    }

                    if self.cancellation.is_cancelled() {
                        self.skip(&mut record, run, &task.id, SkipReason::RunCancelled).await;
                        continue;
                    }
                    if task.trigger_rule == TriggerRule::AllSucceeded
                        && deps.iter().any(TaskStatus::blocks_downstream)
                    {
                        self.skip(&mut record, run, &task.id, SkipReason::UpstreamFailed).await;
                        continue;
                    }
                    if in_flight.len() >= max_concurrency {
                        break;
                    }

                    let upstream = upstream_statuses(graph, &record, &task.id);
                    if let Some(gate) = &task.gate {
                        let ctx = TaskContext::new(
                            &task.id,
                            run.id,
                            run.started_at,
                            0,
                            &store,
                            graph,
                            upstream.clone(),
                        );
                        match gate.evaluate(&ctx) {
                            Ok(true) => debug!(task = %task.id, "Gate passed"),
                            Ok(false) => {
                                info!(task = %task.id, "Gate rejected task");
                                self.skip(&mut record, run, &task.id, SkipReason::GateRejected)
                                    .await;
                                continue;
                            }
                            Err(err) => {
                                error!(task = %task.id, error = %err, "Gate violated context contract");
                                if let Some(entry) = record.task_mut(&task.id) {
                                    entry.mark_failed(err.to_string(), Utc::now());
                                }
                                abort = Some((task.id.clone(), err));
                                break;
                            }
                        }
                    }

                    if let Some(entry) = record.task_mut(&task.id) {
                        entry.start_attempt(Utc::now());
                    }
                    let span = info_span!("task", task = %task.id);
                    in_flight.push(
                        self.run_task(graph, task, &store, run, upstream, &halt)
                            .instrument(span)
                            .boxed(),
                    );
                }
            }

            if abort.is_some() {
                halt.cancel("run aborted");
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };
            if let Some(violation) = self.complete(&mut record, &store, run, outcome).await {
                if abort.is_none() {
                    abort = Some(violation);
                }
            }
        }

        let now = Utc::now();
        let remaining = if abort.is_some() {
            SkipReason::RunAborted
        } else {
            SkipReason::RunCancelled
        };
        let unstarted: Vec<String> = record
            .tasks_with_status(TaskStatus::Pending)
            .into_iter()
            .map(str::to_string)
            .collect();
        for task_id in unstarted {
            self.skip(&mut record, run, &task_id, remaining).await;
        }

        record.finished_at = Some(now);
        record.context = store.snapshot();

        if let Some((task, cause)) = abort {
            record.status = RunStatus::Aborted;
            record.reason = Some(cause.to_string());
            error!(task = %task, error = %cause, "Run aborted");
            self.emit(
                events::RUN_ABORTED,
                json!({"run_id": run.id, "task": task, "error": cause.to_string()}),
            )
            .await;
            return Err(RunAborted {
                run_id: run.id,
                task,
                cause,
                record: Box::new(record),
            });
        }

        if self.cancellation.is_cancelled() {
            record.status = RunStatus::Cancelled;
            record.reason = self.cancellation.reason();
            warn!(reason = ?record.reason, "Run cancelled");
            self.emit(
                events::RUN_CANCELLED,
                json!({"run_id": run.id, "reason": record.reason}),
            )
            .await;
        } else {
            record.status = record.completed_status();
            info!(status = %record.status, "Run completed");
            self.emit(
                events::RUN_COMPLETED,
                json!({"run_id": run.id, "status": record.status}),
            )
            .await;
        }

        Ok(record)
    }

    /// Runs the attempts of one task until it succeeds, exhausts its retry
    /// policy, or violates the context contract.
    async fn run_task<'a>(
        &'a self,
        graph: &'a TaskGraph,
        task: &'a Task,
        store: &'a ContextStore,
        run: RunInfo,
        upstream: BTreeMap<String, TaskStatus>,
        halt: &'a CancellationToken,
    ) -> TaskOutcome {
        let policy = task.retry_policy;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = |result| TaskOutcome {
                task_id: task.id.clone(),
                attempts: attempt,
                result,
            };

            debug!(attempt, max_attempts = policy.max_attempts, "Starting attempt");
            self.emit(
                events::TASK_STARTED,
                json!({"run_id": run.id, "task": task.id, "attempt": attempt}),
            )
            .await;

            let ctx = TaskContext::new(
                &task.id,
                run.id,
                run.started_at,
                attempt,
                store,
                graph,
                upstream.clone(),
            );
            let result = match task.timeout {
                Some(limit) => match tokio::time::timeout(limit, task.action.run(&ctx)).await {
                    Ok(result) => result.map_err(|e| TaskExecutionError::failed(&task.id, attempt, &e)),
                    Err(_) => Err(TaskExecutionError::timed_out(&task.id, attempt, limit)),
                },
                None => task
                    .action
                    .run(&ctx)
                    .await
                    .map_err(|e| TaskExecutionError::failed(&task.id, attempt, &e)),
            };

            if let Some(violation) = ctx.take_violation() {
                return outcome(TaskResult::Violation(violation));
            }

            let err = match result {
                Ok(output) => return outcome(TaskResult::Succeeded(output)),
                Err(err) => err,
            };

            if !policy.allows_retry(attempt) {
                return outcome(TaskResult::Failed(err));
            }
            if self.cancellation.is_cancelled() || halt.is_cancelled() {
                debug!("Run stopping; not retrying");
                return outcome(TaskResult::Failed(err));
            }

            let delay = policy.delay_for_retry(attempt);
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Attempt failed; retrying"
            );
            self.emit(
                events::TASK_RETRYING,
                json!({
                    "run_id": run.id,
                    "task": task.id,
                    "attempt": attempt,
                    "error": err.to_string(),
                    "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                }),
            )
            .await;

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancellation.cancelled() => {
                    info!("Retry wait interrupted by cancellation");
                    return outcome(TaskResult::Failed(err));
                }
                () = halt.cancelled() => {
                    info!("Retry wait interrupted by run abort");
                    return outcome(TaskResult::Failed(err));
                }
            }
        }
    }

    /// Records a finished task. Returns the violation if the run must abort.
    async fn complete(
        &self,
        record: &mut RunRecord,
        store: &ContextStore,
        run: RunInfo,
        outcome: TaskOutcome,
    ) -> Option<(String, ContextError)> {
        let TaskOutcome {
            task_id,
            attempts,
            result,
        } = outcome;
        let now = Utc::now();
        let Some(entry) = record.task_mut(&task_id) else {
            return None;
        };
        entry.attempts = attempts;

        let violation = match result {
            TaskResult::Succeeded(output) => match store.write_output(&task_id, &output) {
                Ok(()) => {
                    entry.mark_succeeded(now);
                    info!(task = %task_id, attempts, outputs = output.len(), "Task succeeded");
                    self.emit(
                        events::TASK_SUCCEEDED,
                        json!({"run_id": run.id, "task": task_id, "attempts": attempts}),
                    )
                    .await;
                    return None;
                }
                Err(err) => err,
            },
            TaskResult::Failed(err) => {
                entry.mark_failed(err.to_string(), now);
                error!(task = %task_id, attempts, error = %err, "Task failed");
                self.emit(
                    events::TASK_FAILED,
                    json!({
                        "run_id": run.id,
                        "task": task_id,
                        "attempts": attempts,
                        "error": err.to_string(),
                    }),
                )
                .await;
                return None;
            }
            TaskResult::Violation(err) => err,
        };

        entry.mark_failed(violation.to_string(), now);
        error!(task = %task_id, error = %violation, "Task violated context contract");
        self.emit(
            events::TASK_FAILED,
            json!({
                "run_id": run.id,
                "task": task_id,
                "attempts": attempts,
                "error": violation.to_string(),
            }),
        )
        .await;
        Some((task_id, violation))
    }

    async fn skip(&self, record: &mut RunRecord, run: RunInfo, task_id: &str, reason: SkipReason) {
        if let Some(entry) = record.task_mut(task_id) {
            entry.mark_skipped(reason, Utc::now());
        }
        info!(task = %task_id, reason = %reason, "Task skipped");
        self.emit(
            events::TASK_SKIPPED,
            json!({"run_id": run.id, "task": task_id, "reason": reason}),
        )
        .await;
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.emit(event_type, Some(data)).await;
    }
}

/// Statuses of every ancestor of `task_id`.
fn upstream_statuses(
    graph: &TaskGraph,
    record: &RunRecord,
    task_id: &str,
) -> BTreeMap<String, TaskStatus> {
    graph
        .ancestors(task_id)
        .into_iter()
        .flatten()
        .filter_map(|ancestor| {
            record
                .status_of(ancestor)
                .map(|status| (ancestor.clone(), status))
        })
        .collect()
}
