//! Collaborators backed by external programs.
//!
//! Each collaborator runs a configured command with `tokio::process`, then
//! looks for its result in the last JSON object the program printed on
//! stdout. Programs that only persist their results to disk are supported
//! through per-collaborator fallbacks.

use super::artifacts::{self, RunInfo};
use super::collaborators::{
    Collaborators, DataPreparer, EvaluationScores, ModelEvaluator, ModelTrainer, SplitCounts,
    TrainingRun,
};
use super::config::{CommandSpec, RetrainConfig};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable naming the experiment-tracking URI.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
/// Environment variable naming the experiment.
pub const EXPERIMENT_NAME_ENV: &str = "MLFLOW_EXPERIMENT_NAME";
/// Environment variable naming the model artifact path.
pub const MODEL_PATH_ENV: &str = "MODEL_PATH";

/// Runs one configured command.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    spec: CommandSpec,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandRunner {
    /// Creates a runner for `spec` with the environment derived from `config`.
    #[must_use]
    pub fn new(spec: CommandSpec, config: &RetrainConfig) -> Self {
        let env = vec![
            (TRACKING_URI_ENV.to_string(), config.tracking.tracking_uri.clone()),
            (EXPERIMENT_NAME_ENV.to_string(), config.tracking.experiment_name.clone()),
            (
                MODEL_PATH_ENV.to_string(),
                config.artifacts.model.to_string_lossy().into_owned(),
            ),
        ];
        Self {
            spec,
            working_dir: config.working_dir.clone(),
            env,
        }
    }

    /// Runs the command to completion and returns its stdout.
    ///
    /// # Errors
    ///
    /// Fails if the program cannot be started or exits unsuccessfully; the
    /// tail of stderr is included in the error.
    pub async fn run(&self) -> Result<String> {
        info!(cmd = %self.spec, "Starting command");

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("spawning `{}`", self.spec))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        for line in stdout.lines() {
            debug!(cmd = %self.spec.program, "stdout: {}", line);
        }
        for line in stderr.lines() {
            debug!(cmd = %self.spec.program, "stderr: {}", line);
        }

        if !output.status.success() {
            bail!(
                "`{}` exited with {}: {}",
                self.spec,
                output.status,
                tail(&stderr, 5)
            );
        }

        info!(cmd = %self.spec, "Command finished");
        Ok(stdout)
    }

    /// Runs the command and decodes the last JSON object on stdout, if any.
    pub async fn run_json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let stdout = self.run().await?;
        last_json_object(&stdout)
            .map(|value| {
                serde_json::from_value(value)
                    .with_context(|| format!("decoding output of `{}`", self.spec))
            })
            .transpose()
    }
}

/// Prepares data by running a command.
///
/// Without JSON output, sample counts are read from lines such as
/// `Train set: data/processed/train.csv (120 samples)`.
#[derive(Debug, Clone)]
pub struct CommandPreparer {
    runner: CommandRunner,
}

impl CommandPreparer {
    /// Creates a command-backed preparer.
    #[must_use]
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DataPreparer for CommandPreparer {
    async fn prepare(&self) -> Result<SplitCounts> {
        let stdout = self.runner.run().await?;
        if let Some(value) = last_json_object(&stdout) {
            return serde_json::from_value(value).context("decoding split counts");
        }

        let train = sample_count(&stdout, "Train set");
        let test = sample_count(&stdout, "Test set");
        match (train, test) {
            (Some(train_samples), Some(test_samples)) => Ok(SplitCounts {
                train_samples,
                test_samples,
            }),
            _ => bail!("`{}` did not report split sizes", self.runner.spec),
        }
    }
}

/// Trains by running a command, falling back to the persisted run info.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    runner: CommandRunner,
    run_info: PathBuf,
}

impl CommandTrainer {
    /// Creates a command-backed trainer.
    #[must_use]
    pub fn new(runner: CommandRunner, run_info: PathBuf) -> Self {
        Self { runner, run_info }
    }
}

#[async_trait]
impl ModelTrainer for CommandTrainer {
    async fn train(&self) -> Result<TrainingRun> {
        if let Some(run) = self.runner.run_json::<TrainingRun>().await? {
            return Ok(run);
        }
        debug!(path = %self.run_info.display(), "No JSON on stdout; reading run info");
        let info: RunInfo = artifacts::read_json(&self.run_info)
            .with_context(|| format!("reading {}", self.run_info.display()))?;
        Ok(info.into())
    }
}

/// Evaluates by running a command, falling back to the metrics it wrote.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    runner: CommandRunner,
    metrics: PathBuf,
}

impl CommandEvaluator {
    /// Creates a command-backed evaluator.
    #[must_use]
    pub fn new(runner: CommandRunner, metrics: PathBuf) -> Self {
        Self { runner, metrics }
    }
}

#[async_trait]
impl ModelEvaluator for CommandEvaluator {
    async fn evaluate(&self) -> Result<EvaluationScores> {
        if let Some(scores) = self.runner.run_json::<EvaluationScores>().await? {
            return Ok(scores);
        }
        debug!(path = %self.metrics.display(), "No JSON on stdout; reading metrics");
        artifacts::read_json(&self.metrics)
            .with_context(|| format!("reading {}", self.metrics.display()))
    }
}

impl Collaborators {
    /// Builds command-backed collaborators from configuration.
    #[must_use]
    pub fn from_config(config: &RetrainConfig) -> Self {
        let runner = |spec: &CommandSpec| CommandRunner::new(spec.clone(), config);
        Self::new(
            Arc::new(CommandPreparer::new(runner(&config.commands.prepare))),
            Arc::new(CommandTrainer::new(
                runner(&config.commands.train),
                config.resolve(&config.artifacts.run_info),
            )),
            Arc::new(CommandEvaluator::new(
                runner(&config.commands.evaluate),
                config.resolve(&config.artifacts.metrics),
            )),
        )
    }
}

/// Returns the last top-level JSON object in `output`, skipping other text.
fn last_json_object(output: &str) -> Option<Value> {
    let mut last = None;
    let mut pos = 0;
    while let Some(offset) = output[pos..].find('{') {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&output[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                pos = start + stream.byte_offset();
                last = Some(value);
            }
            _ => pos = start + 1,
        }
    }
    last
}

/// Parses `N` from a line like `<label>: <path> (N samples)`.
fn sample_count(output: &str, label: &str) -> Option<u64> {
    output
        .lines()
        .filter(|line| line.contains(label))
        .find_map(|line| {
            let open = line.rfind('(')?;
            let count = line[open + 1..].split_whitespace().next()?;
            count.parse().ok()
        })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str, config: &RetrainConfig) -> CommandRunner {
        CommandRunner::new(CommandSpec::new("sh", ["-c", script]), config)
    }

    #[test]
    fn test_last_json_object_skips_noise() {
        let output = "MLflow Run ID: abc\n{\"a\": 1}\nprogress...\n{\n  \"b\": {\"c\": 2}\n}\nDone\n";
        assert_eq!(last_json_object(output), Some(json!({"b": {"c": 2}})));
        assert_eq!(last_json_object("no json here"), None);
        assert_eq!(last_json_object("[1, 2] {broken"), None);
    }

    #[test]
    fn test_sample_count() {
        let output = "\
Data preparation complete!
  - Raw data: data/raw/iris.csv (150 samples)
  - Train set: data/processed/train.csv (120 samples)
  - Test set: data/processed/test.csv (30 samples)
";
        assert_eq!(sample_count(output, "Train set"), Some(120));
        assert_eq!(sample_count(output, "Test set"), Some(30));
        assert_eq!(sample_count(output, "Validation set"), None);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b | c");
        assert_eq!(tail("", 2), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_passes_environment() {
        let config = RetrainConfig::default();
        let stdout = shell("echo $MLFLOW_EXPERIMENT_NAME", &config).run().await.unwrap();
        assert_eq!(stdout.trim(), "iris-classification");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_reports_failure() {
        let config = RetrainConfig::default();
        let err = shell("echo oops >&2; exit 3", &config).run().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_preparer_parses_text_output() {
        let config = RetrainConfig::default();
        let preparer = CommandPreparer::new(shell(
            "echo '  - Train set: train.csv (120 samples)'; echo '  - Test set: test.csv (30 samples)'",
            &config,
        ));
        let counts = preparer.prepare().await.unwrap();
        assert_eq!(
            counts,
            SplitCounts {
                train_samples: 120,
                test_samples: 30
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trainer_falls_back_to_run_info() {
        let dir = tempfile::tempdir().unwrap();
        let run_info = dir.path().join("run_info.json");
        std::fs::write(
            &run_info,
            r#"{"run_id": "r-1", "experiment_id": "3", "train_accuracy": 0.97, "train_f1": 0.96}"#,
        )
        .unwrap();

        let config = RetrainConfig::default();
        let trainer = CommandTrainer::new(shell("echo 'MLflow Run ID: r-1'", &config), run_info);
        let run = trainer.train().await.unwrap();
        assert_eq!(run.run_id, "r-1");
        assert_eq!(run.train_f1, Some(0.96));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_evaluator_prefers_stdout_json() {
        let config = RetrainConfig::default();
        let evaluator = CommandEvaluator::new(
            shell(
                r#"echo '{"accuracy": 0.93, "f1_score": 0.92, "precision": 0.94, "recall": 0.93}'"#,
                &config,
            ),
            PathBuf::from("/nonexistent/metrics.json"),
        );
        let scores = evaluator.evaluate().await.unwrap();
        assert!((scores.accuracy - 0.93).abs() < f64::EPSILON);
    }
}
