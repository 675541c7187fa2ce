//! Durable handoff artifacts.
//!
//! These JSON documents are the only contract between the pipeline and the
//! serving process. Field names are stable.

use super::collaborators::{EvaluationScores, TrainingRun};
use crate::errors::RetrainflowError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata of the training run behind the current model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Experiment-tracking run id.
    pub run_id: String,
    /// Experiment-tracking experiment id.
    pub experiment_id: String,
    /// Accuracy on the training split.
    pub train_accuracy: f64,
    /// Weighted F1 on the training split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_f1: Option<f64>,
}

impl From<&TrainingRun> for RunInfo {
    fn from(run: &TrainingRun) -> Self {
        Self {
            run_id: run.run_id.clone(),
            experiment_id: run.experiment_id.clone(),
            train_accuracy: run.train_accuracy,
            train_f1: run.train_f1,
        }
    }
}

impl From<RunInfo> for TrainingRun {
    fn from(info: RunInfo) -> Self {
        Self {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            train_accuracy: info.train_accuracy,
            train_f1: info.train_f1,
        }
    }
}

/// Evaluation metrics and the deployment decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Test accuracy.
    pub accuracy: f64,
    /// Weighted F1.
    pub f1_score: f64,
    /// Weighted precision.
    pub precision: f64,
    /// Weighted recall.
    pub recall: f64,
    /// Whether `accuracy >= threshold`.
    pub threshold_passed: bool,
}

impl EvaluationMetrics {
    /// Applies the deployment threshold to raw scores.
    #[must_use]
    pub fn from_scores(scores: &EvaluationScores, threshold: f64) -> Self {
        Self {
            accuracy: scores.accuracy,
            f1_score: scores.f1_score,
            precision: scores.precision,
            recall: scores.recall,
            threshold_passed: scores.accuracy >= threshold,
        }
    }
}

/// A completed deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    /// Always `"deployed"`.
    pub status: String,
    /// Training run of the deployed model.
    pub run_id: String,
    /// Test accuracy of the deployed model.
    pub accuracy: f64,
    /// When the deployment was recorded.
    pub deployed_at: DateTime<Utc>,
    /// Model version.
    pub version: String,
}

impl DeploymentInfo {
    /// Status recorded for a completed deployment.
    pub const DEPLOYED: &'static str = "deployed";

    /// Creates a deployment record.
    #[must_use]
    pub fn deployed(
        run_id: impl Into<String>,
        accuracy: f64,
        version: impl Into<String>,
        deployed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Self::DEPLOYED.to_string(),
            run_id: run_id.into(),
            accuracy,
            deployed_at,
            version: version.into(),
        }
    }
}

/// Writes `value` as pretty JSON.
///
/// Parent directories are created. The file is written next to its final
/// location and renamed into place, so readers never see a partial document.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RetrainflowError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

/// Writes text with the same guarantees as [`write_json`].
pub fn write_text(path: &Path, text: &str) -> Result<(), RetrainflowError> {
    write_atomic(path, text.as_bytes())
}

/// Reads a JSON artifact.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RetrainflowError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RetrainflowError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
