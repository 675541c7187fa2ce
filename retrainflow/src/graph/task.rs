//! Task trait and specifications.
//!
//! Tasks are the fundamental units of work in a retrainflow graph.

use crate::context::TaskContext;
use crate::core::TaskOutput;
use crate::errors::ContextError;
use crate::scheduler::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The result of one attempt of a task action.
pub type ActionResult = anyhow::Result<TaskOutput>;

/// Trait for the work a task performs.
///
/// Actions receive a read-only view of upstream outputs and return the
/// outputs they declare, or fail. A failed attempt may be retried, so actions
/// with external side effects should tolerate running more than once.
#[async_trait]
pub trait TaskAction: Send + Sync + Debug {
    /// Runs one attempt.
    async fn run(&self, ctx: &TaskContext<'_>) -> ActionResult;
}

/// A simple function-based action.
pub struct FnAction<F>
where
    F: Fn(&TaskContext<'_>) -> ActionResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&TaskContext<'_>) -> ActionResult + Send + Sync,
{
    /// Creates a new function-based action.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnAction<F>
where
    F: Fn(&TaskContext<'_>) -> ActionResult + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> TaskAction for FnAction<F>
where
    F: Fn(&TaskContext<'_>) -> ActionResult + Send + Sync,
{
    async fn run(&self, ctx: &TaskContext<'_>) -> ActionResult {
        (self.func)(ctx)
    }
}

/// An action that succeeds with no outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAction;

#[async_trait]
impl TaskAction for NoOpAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        Ok(TaskOutput::new())
    }
}

/// When a task becomes eligible to run, given its dependencies' outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    /// Run only if every dependency succeeded; otherwise skip with
    /// `upstream_failed`.
    #[default]
    AllSucceeded,
    /// Run once every dependency is terminal, whatever its outcome.
    AllDone,
}

/// A predicate over the gated task's context view.
pub type GatePredicate = Arc<dyn Fn(&TaskContext<'_>) -> bool + Send + Sync>;

/// A condition evaluated just before a task would run.
#[derive(Clone)]
pub enum Gate {
    /// Passes iff the value at `(task_id, key)` is the boolean `true`.
    ///
    /// An absent or non-boolean value rejects the task.
    Flag {
        /// The upstream task whose output holds the flag.
        task_id: String,
        /// The flag key.
        key: String,
    },
    /// Passes iff the predicate returns true.
    Predicate(GatePredicate),
}

impl Gate {
    /// Creates a flag gate.
    #[must_use]
    pub fn flag(task_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Flag {
            task_id: task_id.into(),
            key: key.into(),
        }
    }

    /// Creates a predicate gate.
    #[must_use]
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Evaluates the gate against the task's view.
    ///
    /// # Errors
    ///
    /// Returns the context violation raised while reading, if any.
    pub fn evaluate(&self, ctx: &TaskContext<'_>) -> Result<bool, ContextError> {
        match self {
            Self::Flag { task_id, key } => match ctx.read_optional(task_id, key)? {
                Some(serde_json::Value::Bool(passed)) => Ok(passed),
                Some(other) => {
                    warn!(
                        task = %ctx.task_id(),
                        gate = %format!("{task_id}.{key}"),
                        value = %other,
                        "Gate flag is not a boolean; rejecting"
                    );
                    Ok(false)
                }
                None => {
                    warn!(
                        task = %ctx.task_id(),
                        gate = %format!("{task_id}.{key}"),
                        "Gate flag is absent; rejecting"
                    );
                    Ok(false)
                }
            },
            Self::Predicate(predicate) => {
                let passed = predicate(ctx);
                match ctx.take_violation() {
                    Some(err) => Err(err),
                    None => Ok(passed),
                }
            }
        }
    }
}

impl Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag { task_id, key } => f
                .debug_struct("Flag")
                .field("task_id", task_id)
                .field("key", key)
                .finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Specification for a single task in a graph.
#[derive(Debug, Clone)]
pub struct Task {
    /// The unique id of the task.
    pub id: String,
    /// Ids of the tasks this task depends on, in declaration order.
    pub dependencies: Vec<String>,
    /// The work to perform.
    pub action: Arc<dyn TaskAction>,
    /// How failed attempts are retried.
    pub retry_policy: RetryPolicy,
    /// Optional gate evaluated before the first attempt.
    pub gate: Option<Gate>,
    /// Optional per-attempt timeout.
    pub timeout: Option<Duration>,
    /// When the task becomes eligible to run.
    pub trigger_rule: TriggerRule,
}

impl Task {
    /// Creates a new task with no dependencies and a single attempt.
    #[must_use]
    pub fn new(id: impl Into<String>, action: Arc<dyn TaskAction>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            action,
            retry_policy: RetryPolicy::default(),
            gate: None,
            timeout: None,
            trigger_rule: TriggerRule::default(),
        }
    }

    /// Adds a dependency. Repeated dependencies are ignored.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Adds several dependencies.
    #[must_use]
    pub fn with_dependencies(self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        deps.into_iter().fold(self, Self::with_dependency)
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Gates the task on a boolean flag written by an upstream task.
    #[must_use]
    pub fn gated_on(self, task_id: impl Into<String>, key: impl Into<String>) -> Self {
        self.with_gate(Gate::flag(task_id, key))
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the trigger rule.
    #[must_use]
    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }
}
