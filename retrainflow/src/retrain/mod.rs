//! The concrete model retraining pipeline.
//!
//! This module provides:
//! - Configuration of the pipeline and its collaborators
//! - Collaborator traits for data preparation, training and evaluation,
//!   with implementations backed by external commands
//! - Durable JSON handoff artifacts
//! - The task actions and the five-task graph wiring them together

mod actions;
pub mod artifacts;
mod collaborators;
mod command;
mod config;
mod pipeline;

pub use actions::{
    DeployAction, EvaluateAction, FileNotifier, LogNotifier, Notifier, NotifyAction,
    PrepareAction, TrainAction,
};
pub use artifacts::{DeploymentInfo, EvaluationMetrics, RunInfo};
pub use collaborators::{
    Collaborators, DataPreparer, EvaluationScores, ModelEvaluator, ModelTrainer, SplitCounts,
    TrainingRun,
};
pub use command::{
    CommandEvaluator, CommandPreparer, CommandRunner, CommandTrainer, EXPERIMENT_NAME_ENV,
    MODEL_PATH_ENV, TRACKING_URI_ENV,
};
pub use config::{
    ArtifactPaths, CommandSpec, CommandsConfig, RetrainConfig, TrackingConfig,
    DEFAULT_RETRY_DELAY,
};
pub use pipeline::{
    build_retrain_graph, RetrainPipeline, DEPLOY_TASK, EVALUATE_TASK, EXTRACT_TASK, NOTIFY_TASK,
    THRESHOLD_FLAG, TRAIN_TASK,
};
