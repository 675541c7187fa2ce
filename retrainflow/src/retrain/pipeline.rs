//! The five-task retrain graph and a runner around it.

use super::actions::{
    DeployAction, EvaluateAction, Notifier, NotifyAction, PrepareAction, TrainAction,
};
use super::collaborators::Collaborators;
use super::config::RetrainConfig;
use crate::context::ContextStore;
use crate::errors::{GraphError, RunAborted};
use crate::events::EventSink;
use crate::graph::{GraphBuilder, Task, TaskGraph, TriggerRule};
use crate::record::RunRecord;
use crate::report::{PipelineSummary, ReportLayout};
use crate::scheduler::{CancellationToken, RetryPolicy, RunScheduler};
use std::sync::Arc;
use tracing::info;

/// Prepares the train/test split.
pub const EXTRACT_TASK: &str = "extract_data";
/// Fits the model.
pub const TRAIN_TASK: &str = "train_model";
/// Scores the model against the threshold.
pub const EVALUATE_TASK: &str = "evaluate";
/// Records the deployment; gated on the evaluation.
pub const DEPLOY_TASK: &str = "deploy";
/// Renders and delivers the report; runs whatever happened upstream.
pub const NOTIFY_TASK: &str = "notify";

/// Flag written by the evaluation task and checked by the deploy gate.
pub const THRESHOLD_FLAG: &str = "threshold_passed";

impl ReportLayout {
    /// The layout of the retrain graph.
    #[must_use]
    pub fn retrain() -> Self {
        Self::new(EXTRACT_TASK, TRAIN_TASK, EVALUATE_TASK, DEPLOY_TASK)
    }
}

/// Builds the retrain graph.
///
/// Every task but the report uses the configured retry policy and timeout.
/// The report task depends on all others with [`TriggerRule::AllDone`] and
/// is never retried.
pub fn build_retrain_graph(
    config: &RetrainConfig,
    collaborators: &Collaborators,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> Result<TaskGraph, GraphError> {
    let artifacts = &config.artifacts;
    let staged = |task: Task| {
        let task = task.with_retry_policy(config.retry);
        match config.task_timeout() {
            Some(timeout) => task.with_timeout(timeout),
            None => task,
        }
    };

    GraphBuilder::new(config.graph_name.clone())
        .task(staged(Task::new(
            EXTRACT_TASK,
            Arc::new(PrepareAction::new(Arc::clone(&collaborators.preparer))),
        )))
        .task(staged(Task::new(
            TRAIN_TASK,
            Arc::new(TrainAction::new(
                Arc::clone(&collaborators.trainer),
                config.resolve(&artifacts.run_info),
            )),
        )))
        .task(staged(Task::new(
            EVALUATE_TASK,
            Arc::new(EvaluateAction::new(
                Arc::clone(&collaborators.evaluator),
                config.threshold,
                config.resolve(&artifacts.metrics),
            )),
        )))
        .task(
            staged(Task::new(
                DEPLOY_TASK,
                Arc::new(DeployAction::new(
                    config.model_version.clone(),
                    config.resolve(&artifacts.deployment),
                )),
            ))
            .gated_on(EVALUATE_TASK, THRESHOLD_FLAG),
        )
        .task(
            Task::new(
                NOTIFY_TASK,
                Arc::new(NotifyAction::new(notifiers, ReportLayout::retrain())),
            )
            .with_dependencies([EXTRACT_TASK, TRAIN_TASK, EVALUATE_TASK, DEPLOY_TASK])
            .with_retry_policy(RetryPolicy::none())
            .with_trigger_rule(TriggerRule::AllDone),
        )
        .chain(&[EXTRACT_TASK, TRAIN_TASK, EVALUATE_TASK, DEPLOY_TASK])
        .build()
}

/// A configured retrain pipeline, ready to run any number of times.
#[derive(Debug)]
pub struct RetrainPipeline {
    graph: TaskGraph,
    scheduler: RunScheduler,
    layout: ReportLayout,
}

impl RetrainPipeline {
    /// Builds the pipeline graph and a scheduler from configuration.
    pub fn new(
        config: &RetrainConfig,
        collaborators: &Collaborators,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Result<Self, GraphError> {
        Ok(Self {
            graph: build_retrain_graph(config, collaborators, notifiers)?,
            scheduler: RunScheduler::new().with_config(config.scheduler),
            layout: ReportLayout::retrain(),
        })
    }

    /// Sets the event sink of the underlying scheduler.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.scheduler = self.scheduler.with_event_sink(sink);
        self
    }

    /// Shares a cancellation token with the underlying scheduler.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.scheduler = self.scheduler.with_cancellation(token);
        self
    }

    /// Returns the token that cancels runs of this pipeline.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.scheduler.cancellation_token()
    }

    /// Returns the task graph.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Runs the pipeline once with an empty context.
    pub async fn run(&self) -> Result<RunRecord, RunAborted> {
        self.run_with(ContextStore::new()).await
    }

    /// Runs the pipeline once with seeded context.
    pub async fn run_with(&self, initial_context: ContextStore) -> Result<RunRecord, RunAborted> {
        let record = self.scheduler.execute(&self.graph, initial_context).await?;
        info!(run_id = %record.run_id, status = %record.status, "Retrain run finished");
        Ok(record)
    }

    /// Summarises a finished run.
    #[must_use]
    pub fn summary(&self, record: &RunRecord) -> PipelineSummary {
        PipelineSummary::from_record(record, &self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunStatus, SkipReason, TaskStatus};
    use crate::events::{self, CollectingEventSink};
    use crate::retrain::artifacts::{self, DeploymentInfo, EvaluationMetrics, RunInfo};
    use crate::retrain::collaborators::{
        EvaluationScores, MockDataPreparer, MockModelEvaluator, MockModelTrainer, SplitCounts,
        TrainingRun,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> RetrainConfig {
        let mut config = RetrainConfig {
            working_dir: Some(dir.path().to_path_buf()),
            retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
            ..RetrainConfig::default()
        };
        config.artifacts.report = Some("report.txt".into());
        config
    }

    fn preparer() -> MockDataPreparer {
        let mut preparer = MockDataPreparer::new();
        preparer.expect_prepare().returning(|| {
            Ok(SplitCounts {
                train_samples: 120,
                test_samples: 30,
            })
        });
        preparer
    }

    fn training_run() -> TrainingRun {
        TrainingRun {
            run_id: "abc123".to_string(),
            experiment_id: "1".to_string(),
            train_accuracy: 0.975,
            train_f1: Some(0.974),
        }
    }

    fn trainer() -> MockModelTrainer {
        let mut trainer = MockModelTrainer::new();
        trainer.expect_train().times(1).returning(|| Ok(training_run()));
        trainer
    }

    fn evaluator(accuracy: f64) -> MockModelEvaluator {
        let mut evaluator = MockModelEvaluator::new();
        evaluator.expect_evaluate().returning(move || {
            Ok(EvaluationScores {
                accuracy,
                f1_score: accuracy,
                precision: accuracy,
                recall: accuracy,
            })
        });
        evaluator
    }

    fn pipeline(
        config: &RetrainConfig,
        trainer: MockModelTrainer,
        evaluator: MockModelEvaluator,
    ) -> RetrainPipeline {
        let collaborators =
            Collaborators::new(Arc::new(preparer()), Arc::new(trainer), Arc::new(evaluator));
        RetrainPipeline::new(config, &collaborators, Vec::new()).unwrap()
    }

    fn status_of(record: &RunRecord, id: &str) -> (TaskStatus, Option<SkipReason>) {
        let task = record.task(id).unwrap();
        (task.status, task.skip_reason)
    }

    #[test]
    fn test_graph_shape() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let pipeline = pipeline(&config, MockModelTrainer::new(), MockModelEvaluator::new());
        let graph = pipeline.graph();

        assert_eq!(graph.name(), "ml_retrain_pipeline");
        assert_eq!(
            graph.topological_order(),
            vec![EXTRACT_TASK, TRAIN_TASK, EVALUATE_TASK, DEPLOY_TASK, NOTIFY_TASK]
        );
        let notify = graph.task(NOTIFY_TASK).unwrap();
        assert_eq!(notify.trigger_rule, TriggerRule::AllDone);
        assert_eq!(notify.retry_policy.max_attempts, 1);
        assert_eq!(notify.dependencies.len(), 4);
        assert!(graph.task(DEPLOY_TASK).unwrap().gate.is_some());
        assert_eq!(graph.task(TRAIN_TASK).unwrap().retry_policy.max_attempts, 3);
    }

    #[test]
    fn test_retrain_layout_names_pipeline_tasks() {
        let layout = ReportLayout::retrain();
        assert_eq!(layout.extract_task, EXTRACT_TASK);
        assert_eq!(layout.train_task, TRAIN_TASK);
        assert_eq!(layout.evaluate_task, EVALUATE_TASK);
        assert_eq!(layout.deploy_task, DEPLOY_TASK);
    }

    #[test]
    fn test_timeout_applied_to_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.task_timeout_secs = Some(30);
        let pipeline = pipeline(&config, MockModelTrainer::new(), MockModelEvaluator::new());

        let graph = pipeline.graph();
        assert_eq!(graph.task(EVALUATE_TASK).unwrap().timeout, Some(Duration::from_secs(30)));
        assert_eq!(graph.task(NOTIFY_TASK).unwrap().timeout, None);
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = pipeline(&config, trainer(), evaluator(0.95)).with_event_sink(sink.clone());

        let record = pipeline.run().await.unwrap();

        assert_eq!(record.status, RunStatus::Succeeded);
        assert!(record.tasks.iter().all(|t| t.status == TaskStatus::Succeeded));
        assert_eq!(record.context.get(DEPLOY_TASK, "status"), Some(&json!("deployed")));
        assert_eq!(record.context.get(NOTIFY_TASK, "status"), Some(&json!("notified")));
        assert_eq!(sink.events_of_type(events::TASK_SUCCEEDED).len(), 5);

        let info: RunInfo = artifacts::read_json(&dir.path().join("models/run_info.json")).unwrap();
        assert_eq!(info.run_id, "abc123");
        let metrics: EvaluationMetrics = artifacts::read_json(&dir.path().join("metrics.json")).unwrap();
        assert!(metrics.threshold_passed);
        let deployment: DeploymentInfo =
            artifacts::read_json(&dir.path().join("models/deployment.json")).unwrap();
        assert_eq!(deployment.version, "1.0.0");

        let report = pipeline.summary(&record).render();
        assert!(report.contains("Training Samples: 120"));
        assert!(report.contains("Model Run: abc123"));
        assert!(report.contains("Train Accuracy: 0.9750"));
        assert!(report.contains("Test Accuracy: 0.9500"));
        assert!(report.contains("Deploy Status: deployed"));
    }

    #[tokio::test]
    async fn test_threshold_miss_skips_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let pipeline = pipeline(&config, trainer(), evaluator(0.85));

        let record = pipeline.run().await.unwrap();

        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(
            status_of(&record, DEPLOY_TASK),
            (TaskStatus::Skipped, Some(SkipReason::GateRejected))
        );
        assert_eq!(status_of(&record, NOTIFY_TASK).0, TaskStatus::Succeeded);
        assert!(!dir.path().join("models/deployment.json").exists());

        let report = record.context.get(NOTIFY_TASK, "report").unwrap();
        assert!(report.as_str().unwrap().contains("Deploy Status: skipped"));
        assert!(report.as_str().unwrap().contains("Test Accuracy: 0.8500"));
    }

    #[tokio::test]
    async fn test_training_failure_skips_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut trainer = MockModelTrainer::new();
        trainer
            .expect_train()
            .times(3)
            .returning(|| Err(anyhow::anyhow!("out of memory")));
        let mut evaluator = MockModelEvaluator::new();
        evaluator.expect_evaluate().never();
        let pipeline = pipeline(&config, trainer, evaluator);

        let record = pipeline.run().await.unwrap();

        assert_eq!(record.status, RunStatus::PartiallyFailed);
        let train = record.task(TRAIN_TASK).unwrap();
        assert_eq!(train.status, TaskStatus::Failed);
        assert_eq!(train.attempts, 3);
        assert!(train.error.as_deref().unwrap().contains("out of memory"));
        for id in [EVALUATE_TASK, DEPLOY_TASK] {
            assert_eq!(
                status_of(&record, id),
                (TaskStatus::Skipped, Some(SkipReason::UpstreamFailed))
            );
        }
        assert_eq!(status_of(&record, NOTIFY_TASK).0, TaskStatus::Succeeded);

        let report = pipeline.summary(&record).render();
        assert!(report.contains("Model Run: N/A"));
        assert!(report.contains("Deploy Status: skipped"));
    }

    #[tokio::test]
    async fn test_training_recovers_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut calls = 0;
        let mut trainer = MockModelTrainer::new();
        trainer.expect_train().times(3).returning(move || {
            calls += 1;
            if calls < 3 {
                Err(anyhow::anyhow!("transient failure {calls}"))
            } else {
                Ok(training_run())
            }
        });
        let pipeline = pipeline(&config, trainer, evaluator(0.95));

        let record = pipeline.run().await.unwrap();

        assert_eq!(record.status, RunStatus::Succeeded);
        let train = record.task(TRAIN_TASK).unwrap();
        assert_eq!(train.status, TaskStatus::Succeeded);
        assert_eq!(train.attempts, 3);
        assert!(train.error.is_none());
        assert_eq!(status_of(&record, DEPLOY_TASK).0, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut trainer = MockModelTrainer::new();
        trainer.expect_train().never();
        let pipeline = pipeline(&config, trainer, MockModelEvaluator::new());
        pipeline.cancellation_token().cancel("shutdown");

        let record = pipeline.run().await.unwrap();

        assert_eq!(record.status, RunStatus::Cancelled);
        assert!(record
            .tasks
            .iter()
            .all(|t| t.skip_reason == Some(SkipReason::RunCancelled)));
    }
}
