//! Mock actions for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::context::TaskContext;
use crate::core::{TaskOutput, TaskStatus};
use crate::graph::{ActionResult, TaskAction};

/// An action that records calls and returns a configurable output.
#[derive(Debug, Default)]
pub struct MockAction {
    output: Mutex<TaskOutput>,
    call_count: Mutex<usize>,
}

impl MockAction {
    /// Creates a mock that succeeds with no outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that succeeds with `output`.
    #[must_use]
    pub fn returning(output: TaskOutput) -> Self {
        Self {
            output: Mutex::new(output),
            call_count: Mutex::new(0),
        }
    }

    /// Sets the output to return.
    pub fn set_output(&self, output: TaskOutput) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl TaskAction for MockAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        *self.call_count.lock() += 1;
        Ok(self.output.lock().clone())
    }
}

/// An action that plays back a script of results, one per attempt.
///
/// Once the script is exhausted the last entry is repeated.
#[derive(Debug)]
pub struct ScriptedAction {
    script: Mutex<VecDeque<Result<TaskOutput, String>>>,
    last: Mutex<Result<TaskOutput, String>>,
    call_count: Mutex<usize>,
}

impl ScriptedAction {
    /// Creates an action from a script.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = Result<TaskOutput, String>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Ok(TaskOutput::new())),
            call_count: Mutex::new(0),
        }
    }

    /// Fails `failures` times, then succeeds with `output`.
    #[must_use]
    pub fn failing_then(failures: usize, error: &str, output: TaskOutput) -> Self {
        let script = (0..failures)
            .map(|n| Err(format!("{error} (call {})", n + 1)))
            .chain(std::iter::once(Ok(output)));
        Self::new(script)
    }

    /// Returns the number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl TaskAction for ScriptedAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        *self.call_count.lock() += 1;
        let next = match self.script.lock().pop_front() {
            Some(next) => {
                *self.last.lock() = next.clone();
                next
            }
            None => self.last.lock().clone(),
        };
        next.map_err(anyhow::Error::msg)
    }
}

/// An action that always fails.
#[derive(Debug)]
pub struct FailingAction {
    error: String,
    call_count: Mutex<usize>,
}

impl FailingAction {
    /// Creates a failing action.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl TaskAction for FailingAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        *self.call_count.lock() += 1;
        Err(anyhow::anyhow!("{}", self.error))
    }
}

/// An action that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowAction {
    delay: Duration,
    output: TaskOutput,
}

impl SlowAction {
    /// Creates a slow action with no outputs.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            output: TaskOutput::new(),
        }
    }

    /// Creates a slow action with a delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Sets the output returned after the delay.
    #[must_use]
    pub fn with_output(mut self, output: TaskOutput) -> Self {
        self.output = output;
        self
    }
}

#[async_trait]
impl TaskAction for SlowAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}

/// One recorded call of a [`RecordingAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The task the action ran for.
    pub task_id: String,
    /// The attempt number.
    pub attempt: u32,
    /// Upstream statuses visible to the call.
    pub upstream: BTreeMap<String, TaskStatus>,
}

/// An action that records what it saw and succeeds with no outputs.
#[derive(Debug, Default)]
pub struct RecordingAction {
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingAction {
    /// Creates a recording action.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TaskAction for RecordingAction {
    async fn run(&self, ctx: &TaskContext<'_>) -> ActionResult {
        self.calls.lock().push(RecordedCall {
            task_id: ctx.task_id().to_string(),
            attempt: ctx.attempt(),
            upstream: ctx.upstream_statuses().clone(),
        });
        Ok(TaskOutput::new())
    }
}
