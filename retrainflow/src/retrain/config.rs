//! Retrain pipeline configuration.
//!
//! Everything the pipeline needs from its environment lives in one
//! [`RetrainConfig`] record, loaded from JSON. Every field has a default, so
//! a config file only has to name what it changes.

use crate::errors::RetrainflowError;
use crate::scheduler::{RetryPolicy, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wait between attempts of a pipeline task.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// An external program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The program to execute.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command spec.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn python(script: &str) -> Self {
        Self::new("python", [script])
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Commands backing the collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Prepares the train/test split.
    pub prepare: CommandSpec,
    /// Fits the model and persists it.
    pub train: CommandSpec,
    /// Scores the persisted model on the test split.
    pub evaluate: CommandSpec,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prepare: CommandSpec::python("src/prepare.py"),
            train: CommandSpec::python("src/train.py"),
            evaluate: CommandSpec::python("src/evaluate.py"),
        }
    }
}

/// Experiment tracking settings forwarded to the training and evaluation
/// commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Tracking server URI or local directory.
    pub tracking_uri: String,
    /// Experiment name.
    pub experiment_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: "./mlruns".to_string(),
            experiment_name: "iris-classification".to_string(),
        }
    }
}

/// Locations of the durable handoff artifacts.
///
/// Relative paths are resolved against [`RetrainConfig::working_dir`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// The persisted model.
    pub model: PathBuf,
    /// Training run metadata read by the serving process.
    pub run_info: PathBuf,
    /// Evaluation metrics.
    pub metrics: PathBuf,
    /// The latest deployment.
    pub deployment: PathBuf,
    /// The latest rendered report, if it should be kept.
    pub report: Option<PathBuf>,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/model.pkl"),
            run_info: PathBuf::from("models/run_info.json"),
            metrics: PathBuf::from("metrics.json"),
            deployment: PathBuf::from("models/deployment.json"),
            report: None,
        }
    }
}

/// Configuration of the retrain pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    /// Name of the task graph.
    pub graph_name: String,
    /// Minimum test accuracy required to deploy.
    pub threshold: f64,
    /// Version stamped on deployments.
    pub model_version: String,
    /// Directory the commands run in and relative paths resolve against.
    pub working_dir: Option<PathBuf>,
    /// Retry policy applied to every pipeline task except the report.
    pub retry: RetryPolicy,
    /// Optional per-attempt timeout in seconds.
    pub task_timeout_secs: Option<u64>,
    /// Scheduler options.
    pub scheduler: SchedulerConfig,
    /// Experiment tracking settings.
    pub tracking: TrackingConfig,
    /// Collaborator commands.
    pub commands: CommandsConfig,
    /// Artifact locations.
    pub artifacts: ArtifactPaths,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            graph_name: "ml_retrain_pipeline".to_string(),
            threshold: 0.9,
            model_version: "1.0.0".to_string(),
            working_dir: None,
            retry: RetryPolicy::fixed(2, DEFAULT_RETRY_DELAY),
            task_timeout_secs: None,
            scheduler: SchedulerConfig::default(),
            tracking: TrackingConfig::default(),
            commands: CommandsConfig::default(),
            artifacts: ArtifactPaths::default(),
        }
    }
}

impl RetrainConfig {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, RetrainflowError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrainflowError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RetrainflowError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that deserialize fine but cannot be run.
    pub fn validate(&self) -> Result<(), RetrainflowError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RetrainflowError::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(RetrainflowError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.model_version.trim().is_empty() {
            return Err(RetrainflowError::Config("model_version must not be empty".to_string()));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(RetrainflowError::Config(
                "task_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Resolves a path against the working directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}
