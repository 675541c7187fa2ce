//! Task actions of the retrain pipeline.

use super::artifacts::{self, DeploymentInfo, EvaluationMetrics, RunInfo};
use super::collaborators::{DataPreparer, ModelEvaluator, ModelTrainer};
use super::pipeline::{EVALUATE_TASK, TRAIN_TASK};
use crate::context::TaskContext;
use crate::core::TaskOutput;
use crate::graph::{ActionResult, TaskAction};
use crate::report::{PipelineSummary, ReportLayout};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs data preparation and reports the split sizes.
pub struct PrepareAction {
    preparer: Arc<dyn DataPreparer>,
}

impl PrepareAction {
    /// Creates the action.
    #[must_use]
    pub fn new(preparer: Arc<dyn DataPreparer>) -> Self {
        Self { preparer }
    }
}

#[async_trait]
impl TaskAction for PrepareAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        let counts = self.preparer.prepare().await.context("data preparation failed")?;
        info!(
            train_samples = counts.train_samples,
            test_samples = counts.test_samples,
            "Extracted train/test split"
        );
        Ok(TaskOutput::from_serializable(&counts)?)
    }
}

/// Trains the model and persists the run info artifact.
pub struct TrainAction {
    trainer: Arc<dyn ModelTrainer>,
    run_info: PathBuf,
}

impl TrainAction {
    /// Creates the action.
    #[must_use]
    pub fn new(trainer: Arc<dyn ModelTrainer>, run_info: PathBuf) -> Self {
        Self { trainer, run_info }
    }
}

#[async_trait]
impl TaskAction for TrainAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        let run = self.trainer.train().await.context("model training failed")?;
        info!(
            run_id = %run.run_id,
            train_accuracy = format_args!("{:.4}", run.train_accuracy),
            "Training complete"
        );
        artifacts::write_json(&self.run_info, &RunInfo::from(&run))
            .context("writing run info")?;
        Ok(TaskOutput::from_serializable(&run)?)
    }
}

/// Scores the model and decides whether it may be deployed.
pub struct EvaluateAction {
    evaluator: Arc<dyn ModelEvaluator>,
    threshold: f64,
    metrics: PathBuf,
}

impl EvaluateAction {
    /// Creates the action.
    #[must_use]
    pub fn new(evaluator: Arc<dyn ModelEvaluator>, threshold: f64, metrics: PathBuf) -> Self {
        Self {
            evaluator,
            threshold,
            metrics,
        }
    }
}

#[async_trait]
impl TaskAction for EvaluateAction {
    async fn run(&self, _ctx: &TaskContext<'_>) -> ActionResult {
        let scores = self.evaluator.evaluate().await.context("evaluation failed")?;
        let metrics = EvaluationMetrics::from_scores(&scores, self.threshold);
        info!(
            accuracy = format_args!("{:.4}", metrics.accuracy),
            threshold = self.threshold,
            threshold_passed = metrics.threshold_passed,
            "Evaluation complete"
        );
        if !metrics.threshold_passed {
            warn!("Model did not meet accuracy threshold");
        }
        artifacts::write_json(&self.metrics, &metrics).context("writing metrics")?;
        Ok(TaskOutput::from_serializable(&metrics)?)
    }
}

/// Records the deployment of the evaluated model.
pub struct DeployAction {
    version: String,
    deployment: PathBuf,
}

impl DeployAction {
    /// Creates the action.
    #[must_use]
    pub fn new(version: impl Into<String>, deployment: PathBuf) -> Self {
        Self {
            version: version.into(),
            deployment,
        }
    }
}

#[async_trait]
impl TaskAction for DeployAction {
    async fn run(&self, ctx: &TaskContext<'_>) -> ActionResult {
        let run_id = ctx.read(TRAIN_TASK, "run_id")?;
        let accuracy = ctx.read(EVALUATE_TASK, "accuracy")?;

        let info = DeploymentInfo::deployed(
            run_id.as_str().context("run_id is not a string")?,
            accuracy.as_f64().context("accuracy is not a number")?,
            self.version.clone(),
            Utc::now(),
        );
        artifacts::write_json(&self.deployment, &info).context("writing deployment info")?;
        info!(run_id = %info.run_id, version = %info.version, "Deployment complete");
        Ok(TaskOutput::from_serializable(&info)?)
    }
}

/// Delivers a rendered report.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the report.
    async fn notify(&self, report: &str) -> anyhow::Result<()>;
}

/// Logs the report.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &str) -> anyhow::Result<()> {
        info!("\n{report}");
        Ok(())
    }
}

/// Writes the report to a file, replacing the previous one.
#[derive(Debug, Clone)]
pub struct FileNotifier {
    path: PathBuf,
}

impl FileNotifier {
    /// Creates a notifier writing to `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn notify(&self, report: &str) -> anyhow::Result<()> {
        artifacts::write_text(&self.path, report)?;
        Ok(())
    }
}

/// Renders the run report from whatever upstream outputs exist.
///
/// Never fails: delivery errors are logged and the report is still returned
/// as output.
pub struct NotifyAction {
    notifiers: Vec<Arc<dyn Notifier>>,
    layout: ReportLayout,
}

impl NotifyAction {
    /// Status recorded once the report is rendered.
    pub const NOTIFIED: &'static str = "notified";

    /// Creates the action.
    #[must_use]
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>, layout: ReportLayout) -> Self {
        Self { notifiers, layout }
    }
}

#[async_trait]
impl TaskAction for NotifyAction {
    async fn run(&self, ctx: &TaskContext<'_>) -> ActionResult {
        let report = PipelineSummary::from_context(ctx, &self.layout).render();
        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(&report).await {
                warn!(error = %format!("{err:#}"), "Failed to deliver report");
            }
        }
        Ok(TaskOutput::new()
            .with("status", Self::NOTIFIED)
            .with("report", report))
    }
}

macro_rules! opaque_debug {
    ($($ty:ident),*) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty)).finish_non_exhaustive()
            }
        })*
    };
}

opaque_debug!(PrepareAction, TrainAction, EvaluateAction, DeployAction, NotifyAction);
